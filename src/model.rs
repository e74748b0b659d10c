//! Backing list built from a directory of image files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

/// File extensions treated as images (lowercase).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff", "ico", "pnm", "tga", "qoi",
];

/// Image files of one directory, sorted by file name. Row `i` is keyed by
/// the path of the `i`-th file.
#[derive(Debug)]
pub struct DirectoryModel {
    dir: PathBuf,
    entries: Vec<PathBuf>,
}

impl DirectoryModel {
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut model = Self {
            dir: dir.to_path_buf(),
            entries: Vec::new(),
        };
        model.refresh()?;
        Ok(model)
    }

    /// Re-read the directory. Returns whether the listing changed.
    pub fn refresh(&mut self) -> Result<bool> {
        let read = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.display()))?;
        let mut entries = Vec::new();
        for entry in read {
            let path = entry
                .with_context(|| format!("failed to list {}", self.dir.display()))?
                .path();
            if path.is_file() && is_image_path(&path) {
                entries.push(path);
            }
        }
        entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let changed = entries != self.entries;
        if changed {
            info!("model: {} images in {}", entries.len(), self.dir.display());
        } else {
            debug!("model: {} unchanged", self.dir.display());
        }
        self.entries = entries;
        Ok(changed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.entries.get(index).map(PathBuf::as_path)
    }

    /// Cache/decode key of row `index`.
    pub fn key(&self, index: usize) -> Option<String> {
        self.path(index).map(|p| p.to_string_lossy().into_owned())
    }
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("gridload-model-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn lists_images_sorted_by_name() {
        let dir = temp_dir("sorted");
        for name in ["b.PNG", "a.jpg", "notes.txt", "c.webp"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.join("sub.png")).unwrap();

        let model = DirectoryModel::scan(&dir).unwrap();
        let names: Vec<_> = (0..model.len())
            .map(|i| model.path(i).unwrap().file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.jpg", "b.PNG", "c.webp"]);
        assert!(model.key(0).unwrap().ends_with("a.jpg"));
        assert!(model.key(3).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn refresh_reports_changes() {
        let dir = temp_dir("refresh");
        std::fs::write(dir.join("a.png"), b"x").unwrap();
        let mut model = DirectoryModel::scan(&dir).unwrap();
        assert!(!model.refresh().unwrap());

        std::fs::write(dir.join("b.png"), b"x").unwrap();
        assert!(model.refresh().unwrap());
        assert_eq!(model.len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = DirectoryModel::scan(Path::new("/nonexistent/gridload")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read"));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(is_image_path(Path::new("x/Photo.JPEG")));
        assert!(!is_image_path(Path::new("x/readme")));
        assert!(!is_image_path(Path::new("x/archive.zip")));
    }
}
