//! Eligible-image discovery
//!
//! Ingestion takes .jpg/.jpeg files from the top level of the source
//! directory. Zero eligible images is a no-op success upstream.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// List eligible images in `input_dir`, sorted for deterministic processing
pub fn scan(input_dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !input_dir.exists() {
        return Err(ScanError::PathNotFound(input_dir.to_path_buf()));
    }

    if !input_dir.is_dir() {
        return Err(ScanError::NotADirectory(input_dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(entry.into_path()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                None
            }
        })
        .filter(|path| is_eligible(path))
        .collect();

    files.sort();
    Ok(files)
}

fn is_eligible(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            ext == "jpg" || ext == "jpeg"
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_only_jpegs_at_top_level() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(dir.path().join("b.JPEG"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.jpg"), b"x").unwrap();

        let files = scan(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.JPEG"]);
    }

    #[test]
    fn test_empty_directory_is_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory_errors() {
        assert!(matches!(
            scan(Path::new("/nonexistent/input")),
            Err(ScanError::PathNotFound(_))
        ));
    }
}
