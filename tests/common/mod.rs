//! Shared test harness for integration tests.
//!
//! Provides [`FakeTools`], a temporary directory holding shell-script
//! stand-ins for `colmap` and the OpenMVS binaries. Each script appends its
//! name and arguments to a call log and writes the artifact the real tool
//! would produce into its working directory.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use photoforge::config::{Config, ToolsConfig};
use tempfile::TempDir;

/// Artifact written by each OpenMVS tool, relative to the result dir.
const OPENMVS_OUTPUTS: [(&str, &str); 5] = [
    ("InterfaceCOLMAP", ": > scene.mvs"),
    ("DensifyPointCloud", ": > scene_dense.mvs"),
    ("ReconstructMesh", ": > scene_dense_mesh.ply"),
    ("RefineMesh", ": > scene_dense_mesh_refine.ply"),
    (
        "TextureMesh",
        ": > result.obj; : > result.mtl; : > result_material_0_map_Kd.jpg",
    ),
];

/// Fake reconstruction toolchain living in a temp directory.
pub struct FakeTools {
    dir: TempDir,
}

impl FakeTools {
    /// Install a working fake `colmap` and all OpenMVS tools.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        std::fs::create_dir_all(dir.path().join("mvs")).unwrap();
        let tools = Self { dir };

        let log = tools.log_path();
        tools.install(
            &tools.colmap_path(),
            &format!(
                r#"#!/bin/sh
echo "colmap $*" >> '{log}'
case "$1" in
  feature_extractor)
    echo "Extracting features 1/2"
    echo "Extracting features 2/2"
    : > database.db ;;
  sequential_matcher) echo "Matching" ;;
  mapper) mkdir -p sparse/0 && : > sparse/0/cameras.bin ;;
  model_converter) mkdir -p sparse/0/sparse && : > sparse/0/sparse/cameras.txt ;;
  image_undistorter) mkdir -p images_undistorted/images && : > images_undistorted/images/image1.jpg ;;
  help) echo "COLMAP 3.9 (fake)" ;;
esac
echo "finished $1" >&2
"#,
                log = log.display()
            ),
        );

        for (name, output) in OPENMVS_OUTPUTS {
            tools.install_openmvs(name, output);
        }
        tools
    }

    fn install(&self, path: &Path, script: &str) {
        std::fs::write(path, script).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn install_openmvs(&self, name: &str, body: &str) {
        let script = format!(
            "#!/bin/sh\necho \"{name} $*\" >> '{log}'\necho \"{name} working\"\n{body}\n",
            log = self.log_path().display()
        );
        self.install(&self.openmvs_dir().join(name), &script);
    }

    /// Replace `name` with a tool that prints an error and exits with 3.
    pub fn failing(self, name: &str) -> Self {
        self.install_openmvs(name, "echo \"fatal error in $0\" >&2\nexit 3");
        self
    }

    /// Remove the OpenMVS tool `name` entirely.
    pub fn without(self, name: &str) -> Self {
        std::fs::remove_file(self.openmvs_dir().join(name)).unwrap();
        self
    }

    pub fn colmap_path(&self) -> PathBuf {
        self.dir.path().join("bin/colmap")
    }

    pub fn openmvs_dir(&self) -> PathBuf {
        self.dir.path().join("mvs")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// Every recorded invocation, one `tool args...` line each.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.log_path())
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// The tool or COLMAP subcommand of every recorded invocation.
    pub fn steps(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|line| {
                let mut words = line.split_whitespace();
                match words.next() {
                    Some("colmap") => words.next().unwrap_or_default().to_string(),
                    Some(tool) => tool.to_string(),
                    None => String::new(),
                }
            })
            .collect()
    }

    /// Config pointing at the fake tools.
    pub fn config(&self) -> Config {
        Config {
            tools: ToolsConfig {
                colmap_path: Some(self.colmap_path()),
                openmvs_bin_dir: Some(self.openmvs_dir()),
                timeout_secs: Some(60),
            },
            ..Default::default()
        }
    }

    /// Write a TOML config pointing at the fake tools into `dir`.
    pub fn write_config(&self, dir: &Path) -> PathBuf {
        let path = dir.join("photoforge.toml");
        let content = format!(
            "[tools]\ncolmap_path = '{}'\nopenmvs_bin_dir = '{}'\ntimeout_secs = 60\n",
            self.colmap_path().display(),
            self.openmvs_dir().display()
        );
        std::fs::write(&path, content).unwrap();
        path
    }
}

/// A dataset directory holding `count` small JPEGs plus a stray text file.
pub fn dataset(count: usize) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..count {
        std::fs::write(dir.path().join(format!("IMG_{i:04}.JPG")), vec![0xFF; 16 + i]).unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
    dir
}
