//! Input enumeration and cleanup of consumed items.
//!
//! The pipeline core only depends on the [`InputSource`] trait; the bundled
//! [`ImageDirSource`] is the filesystem implementation used by the binary.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One unit of source material, immutable once enumerated.
///
/// `index` is the position in discovery order; the aggregator uses it as a
/// deterministic tie-break since task completion order is unspecified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputItem {
    /// Position in discovery order.
    pub index: usize,
    /// Path to the source file.
    pub path: PathBuf,
}

impl InputItem {
    /// Creates a new input item.
    #[must_use]
    pub fn new(index: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
        }
    }
}

/// Yields the set of input items to process and removes consumed ones.
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Enumerates the items to process. Order carries no meaning beyond the
    /// indices assigned to the returned items.
    async fn discover(&self) -> std::io::Result<Vec<InputItem>>;

    /// Removes consumed items from their origin location.
    ///
    /// Returns the number actually removed; per-item failures are logged,
    /// never propagated.
    async fn remove(&self, items: &[InputItem]) -> usize;
}

/// Recursive directory scan for image files.
#[derive(Debug, Clone)]
pub struct ImageDirSource {
    root: PathBuf,
    skip_dirs: Vec<String>,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

impl ImageDirSource {
    /// Creates a source scanning `root` for `.jpg`/`.jpeg`/`.png` files.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skip_dirs: Vec::new(),
        }
    }

    /// Adds a directory name that is skipped during the scan (e.g. the
    /// output directory, so a run never re-consumes its own products).
    #[must_use]
    pub fn skip_dir(mut self, name: impl Into<String>) -> Self {
        self.skip_dirs.push(name.into());
        self
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }

    fn scan(&self, dir: &Path, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                let name = entry.file_name();
                let skipped = name
                    .to_str()
                    .is_some_and(|n| self.skip_dirs.iter().any(|s| s == n));
                if !skipped {
                    self.scan(&path, found)?;
                }
            } else if Self::is_image(&path) {
                found.push(path);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl InputSource for ImageDirSource {
    async fn discover(&self) -> std::io::Result<Vec<InputItem>> {
        let mut paths = Vec::new();
        self.scan(&self.root, &mut paths)?;
        paths.sort();
        Ok(paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| InputItem::new(index, path))
            .collect())
    }

    async fn remove(&self, items: &[InputItem]) -> usize {
        let mut removed = 0;
        for item in items {
            match std::fs::remove_file(&item.path) {
                Ok(()) => {
                    info!(path = %item.path.display(), "Removed consumed input");
                    removed += 1;
                }
                Err(e) => {
                    warn!(path = %item.path.display(), error = %e, "Failed to remove input");
                }
            }
        }
        info!(removed, total = items.len(), "Input cleanup finished");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_discover_finds_images_recursively() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.jpg"), b"x").expect("write");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        fs::write(dir.path().join("sub/b.PNG"), b"x").expect("write");
        fs::write(dir.path().join("notes.txt"), b"x").expect("write");

        let source = ImageDirSource::new(dir.path());
        let items = source.discover().await.expect("discover");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].index, 0);
        assert_eq!(items[1].index, 1);
    }

    #[tokio::test]
    async fn test_discover_skips_configured_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("output")).expect("mkdir");
        fs::write(dir.path().join("output/c.jpg"), b"x").expect("write");
        fs::write(dir.path().join("a.jpg"), b"x").expect("write");

        let source = ImageDirSource::new(dir.path()).skip_dir("output");
        let items = source.discover().await.expect("discover");

        assert_eq!(items.len(), 1);
        assert!(items[0].path.ends_with("a.jpg"));
    }

    #[tokio::test]
    async fn test_remove_counts_and_tolerates_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let existing = dir.path().join("a.jpg");
        fs::write(&existing, b"x").expect("write");

        let items = vec![
            InputItem::new(0, &existing),
            InputItem::new(1, dir.path().join("gone.jpg")),
        ];

        let source = ImageDirSource::new(dir.path());
        let removed = source.remove(&items).await;

        assert_eq!(removed, 1);
        assert!(!existing.exists());
    }
}
