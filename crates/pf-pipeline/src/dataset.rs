//! Dataset discovery and image staging.

use std::path::{Path, PathBuf};

use pf_core::{Error, Result};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Whether `path` carries one of `extensions` (case-insensitive).
pub fn is_image_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// List the images directly inside `dataset`, sorted by file name.
///
/// Fails with [`Error::MissingInput`] when the directory cannot be read or
/// holds no file with a recognized extension.
pub fn find_images(dataset: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dataset.is_dir() {
        return Err(Error::missing_input(dataset, "dataset directory does not exist"));
    }

    let images: Vec<PathBuf> = WalkDir::new(dataset)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image_file(p, extensions))
        .collect();

    if images.is_empty() {
        return Err(Error::missing_input(
            dataset,
            format!("no image files (expected one of: {})", extensions.join(", ")),
        ));
    }

    debug!("Found {} images in {}", images.len(), dataset.display());
    Ok(images)
}

/// Copy `images` into `dest` as `image1.<ext>`, `image2.<ext>`, ...
///
/// A destination file that already exists with the same size is left
/// alone, so staging a dataset twice copies nothing.
pub fn stage_images(images: &[PathBuf], dest: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dest)?;

    let mut staged = Vec::with_capacity(images.len());
    let mut copied = 0usize;

    for (i, src) in images.iter().enumerate() {
        let name = match src.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("image{}.{ext}", i + 1),
            None => format!("image{}", i + 1),
        };
        let target = dest.join(name);

        let src_len = std::fs::metadata(src)?.len();
        let up_to_date = std::fs::metadata(&target)
            .map(|m| m.is_file() && m.len() == src_len)
            .unwrap_or(false);

        if !up_to_date {
            std::fs::copy(src, &target)?;
            copied += 1;
        }
        staged.push(target);
    }

    info!(
        "Staged {} images into {} ({copied} copied)",
        staged.len(),
        dest.display()
    );
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn exts() -> Vec<String> {
        vec!["jpg".into(), "jpeg".into(), "png".into()]
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(is_image_file(Path::new("a/IMG_001.JPG"), &exts()));
        assert!(is_image_file(Path::new("b.Png"), &exts()));
        assert!(!is_image_file(Path::new("notes.txt"), &exts()));
        assert!(!is_image_file(Path::new("jpg"), &exts()));
    }

    #[test]
    fn find_images_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.png", "a.jpg", "readme.md", "b.JPEG"] {
            std::fs::write(dir.path().join(name), b"data").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.jpg")).unwrap();

        let images = find_images(dir.path(), &exts()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.JPEG", "c.png"]);
    }

    #[test]
    fn empty_dataset_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        assert_matches!(find_images(dir.path(), &exts()), Err(Error::MissingInput { .. }));
    }

    #[test]
    fn nonexistent_dataset_is_missing_input() {
        assert_matches!(
            find_images(Path::new("/nonexistent/dataset_xyz"), &exts()),
            Err(Error::MissingInput { .. })
        );
    }

    #[test]
    fn staging_renames_and_is_repeatable() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("x.jpg"), b"one").unwrap();
        std::fs::write(src.path().join("y.PNG"), b"two!").unwrap();

        let images = find_images(src.path(), &exts()).unwrap();
        let staged = stage_images(&images, &dest.path().join("images_temp")).unwrap();
        assert_eq!(
            staged,
            vec![
                dest.path().join("images_temp/image1.jpg"),
                dest.path().join("images_temp/image2.PNG"),
            ]
        );
        assert_eq!(std::fs::read(&staged[1]).unwrap(), b"two!");

        let again = stage_images(&images, &dest.path().join("images_temp")).unwrap();
        assert_eq!(again, staged);
    }
}
