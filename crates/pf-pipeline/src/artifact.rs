//! Presence checks on stage artifacts.
//!
//! A stage counts as done when its output marker exists: a file marker must
//! exist, a directory marker must exist and hold at least one entry. The
//! contents are never inspected.

use std::path::{Path, PathBuf};

use crate::stage::{OutputMarker, Stage};

#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactChecker;

impl ArtifactChecker {
    pub fn new() -> Self {
        Self
    }

    /// Whether a single marker is present under `result_dir`.
    pub fn is_present(&self, marker: OutputMarker, result_dir: &Path) -> bool {
        let path = marker.path(result_dir);
        match marker {
            OutputMarker::File(_) => path.exists(),
            OutputMarker::Dir(_) => std::fs::read_dir(&path)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false),
        }
    }

    /// Whether `stage` already produced its output.
    pub fn is_complete(&self, stage: &Stage, result_dir: &Path) -> bool {
        self.is_present(stage.marker, result_dir)
    }

    /// Declared inputs of `stage` that are absent, as absolute paths.
    pub fn missing_inputs(&self, stage: &Stage, result_dir: &Path) -> Vec<PathBuf> {
        stage
            .inputs
            .iter()
            .filter(|&&marker| !self.is_present(marker, result_dir))
            .map(|marker| marker.path(result_dir))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{stage, StageName};

    #[test]
    fn file_marker_needs_file() {
        let dir = tempfile::tempdir().unwrap();
        let checker = ArtifactChecker::new();
        let reconstruct = stage(StageName::ReconstructMesh);

        assert!(!checker.is_complete(reconstruct, dir.path()));
        std::fs::write(dir.path().join("scene_dense_mesh.ply"), b"ply").unwrap();
        assert!(checker.is_complete(reconstruct, dir.path()));
    }

    #[test]
    fn empty_file_still_counts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("result.obj"), b"").unwrap();
        assert!(ArtifactChecker::new().is_complete(stage(StageName::TextureMesh), dir.path()));
    }

    #[test]
    fn dir_marker_needs_entries() {
        let dir = tempfile::tempdir().unwrap();
        let checker = ArtifactChecker::new();
        let sparse = stage(StageName::SparseReconstruct);

        std::fs::create_dir_all(dir.path().join("sparse/0")).unwrap();
        assert!(!checker.is_complete(sparse, dir.path()), "empty dir is not done");

        std::fs::write(dir.path().join("sparse/0/cameras.bin"), b"x").unwrap();
        assert!(checker.is_complete(sparse, dir.path()));
    }

    #[test]
    fn file_where_dir_expected_is_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("images_undistorted"), b"oops").unwrap();
        assert!(!ArtifactChecker::new().is_complete(stage(StageName::UndistortImages), dir.path()));
    }

    #[test]
    fn missing_inputs_lists_absent_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let checker = ArtifactChecker::new();
        let refine = stage(StageName::RefineMesh);

        let missing = checker.missing_inputs(refine, dir.path());
        assert_eq!(
            missing,
            vec![
                dir.path().join("scene_dense.mvs"),
                dir.path().join("scene_dense_mesh.ply"),
            ]
        );

        std::fs::write(dir.path().join("scene_dense.mvs"), b"").unwrap();
        assert_eq!(
            checker.missing_inputs(refine, dir.path()),
            vec![dir.path().join("scene_dense_mesh.ply")]
        );
    }
}
