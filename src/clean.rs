//! Removal of intermediate artifacts from a finished result directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Extensions of the deliverable files that survive a clean.
const KEEP_EXTENSIONS: [&str; 4] = ["obj", "mtl", "jpg", "png"];

/// What a clean removed and kept.
#[derive(Debug, Default)]
pub struct CleanSummary {
    pub removed: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
}

/// Whether `path` is part of the textured result (`result*.obj`, its
/// material file and texture images).
pub fn is_deliverable(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| KEEP_EXTENSIONS.iter().any(|k| k.eq_ignore_ascii_case(e)))
        .unwrap_or(false);
    name.starts_with("result") && ext_ok && path.is_file()
}

/// Delete everything in `result_dir` except the deliverables.
pub fn clean_result_dir(result_dir: &Path) -> Result<CleanSummary> {
    if !result_dir.is_dir() {
        anyhow::bail!("Result directory does not exist: {:?}", result_dir);
    }

    let mut summary = CleanSummary::default();
    let entries = std::fs::read_dir(result_dir)
        .with_context(|| format!("Failed to read {:?}", result_dir))?;

    for entry in entries {
        let path = entry?.path();
        if is_deliverable(&path) {
            summary.kept.push(path);
            continue;
        }

        let removed = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.with_context(|| format!("Failed to remove {:?}", path))?;
        tracing::debug!("Removed {:?}", path);
        summary.removed.push(path);
    }

    summary.kept.sort();
    summary.removed.sort();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn keeps_only_result_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in [
            "result.obj",
            "result.mtl",
            "result_material_0_map_Kd.jpg",
            "scene.mvs",
            "scene_dense_mesh.ply",
            "database.db",
            "notes.png",
        ] {
            fs::write(root.join(name), b"x").unwrap();
        }
        fs::create_dir_all(root.join("sparse/0")).unwrap();
        fs::write(root.join("sparse/0/cameras.bin"), b"x").unwrap();

        let summary = clean_result_dir(root).unwrap();

        let mut left: Vec<String> = fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec!["result.mtl", "result.obj", "result_material_0_map_Kd.jpg"]
        );
        assert_eq!(summary.kept.len(), 3);
        assert_eq!(summary.removed.len(), 5);
    }

    #[test]
    fn missing_dir_is_an_error() {
        assert!(clean_result_dir(Path::new("/nonexistent/result_xyz")).is_err());
    }

    #[test]
    fn deliverable_check() {
        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("result.OBJ");
        fs::write(&obj, b"x").unwrap();
        assert!(is_deliverable(&obj));
        assert!(!is_deliverable(&dir.path().join("result.ply")));
    }
}
