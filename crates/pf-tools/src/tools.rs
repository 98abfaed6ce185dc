//! External tool detection and management.
//!
//! The [`ToolRegistry`] resolves the locations of the reconstruction tools
//! (`colmap` and the OpenMVS binaries) and provides lookup methods for the
//! pipeline. Resolution is total: a tool that cannot be found resolves to
//! its bare name, so the failure surfaces as a spawn failure of the stage
//! that needs it rather than up front.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pf_core::config::ToolsConfig;
use serde::Serialize;

/// The COLMAP executable; all COLMAP steps are subcommands of it.
pub const COLMAP: &str = "colmap";

/// OpenMVS binaries, looked up in the configured bin directory.
pub const OPENMVS_TOOLS: &[&str] = &[
    "InterfaceCOLMAP",
    "DensifyPointCloud",
    "ReconstructMesh",
    "RefineMesh",
    "TextureMesh",
];

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the resolved path points at an existing file.
    pub available: bool,
    /// First line of the tool's help banner, if it could be run.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Registry holding resolved tool paths.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, PathBuf>,
}

impl ToolRegistry {
    /// Resolve every known tool.
    ///
    /// A configured location is authoritative and is used even if nothing
    /// exists there yet. Otherwise [`which::which`] searches `PATH`, and a
    /// tool that is not found keeps its bare name.
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let mut tools = BTreeMap::new();

        let colmap = tools_config
            .colmap_path
            .clone()
            .unwrap_or_else(|| search_path(COLMAP));
        tools.insert(COLMAP, colmap);

        for &name in OPENMVS_TOOLS {
            let path = match tools_config.openmvs_bin_dir {
                Some(ref dir) => dir.join(name),
                None => search_path(name),
            };
            tools.insert(name, path);
        }

        for (name, path) in &tools {
            tracing::debug!("Resolved {name} -> {}", path.display());
        }

        Self { tools }
    }

    /// Path used to launch `name`. Unknown names resolve to themselves.
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.tools
            .get(name)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// Path to `colmap`.
    pub fn colmap(&self) -> PathBuf {
        self.resolve(COLMAP)
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|(&name, path)| {
                let available = is_executable_file(path);
                let version = if available {
                    detect_version(name, path)
                } else {
                    None
                };
                ToolInfo {
                    name: name.to_string(),
                    available,
                    version,
                    path: path.clone(),
                }
            })
            .collect()
    }
}

fn search_path(name: &str) -> PathBuf {
    which::which(name).unwrap_or_else(|_| PathBuf::from(name))
}

fn is_executable_file(path: &Path) -> bool {
    if path.components().count() == 1 {
        // A bare name means the PATH search came up empty.
        return false;
    }
    path.is_file()
}

/// Run the tool's help command and return the first non-empty output line.
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let help_arg = if name == COLMAP { "help" } else { "--help" };

    let output = std::process::Command::new(path)
        .arg(help_arg)
        .stdin(std::process::Stdio::null())
        .output()
        .ok()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
