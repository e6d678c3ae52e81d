use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

/// Manages the directory the portraits are saved to.
#[derive(Debug, Clone)]
pub(crate) struct DirectoryManager {
    root_dir: PathBuf,
    extension: String,
}

impl DirectoryManager {
    /// Creates the manager, creating `root_dir` if it is missing.
    pub(crate) fn new(root_dir: impl AsRef<Path>, extension: &str) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        fs::create_dir_all(&root_dir)
            .with_context(|| format!("Failed to create output directory at {:?}", root_dir))?;
        debug!("Saving images to {}", root_dir.display());

        Ok(DirectoryManager {
            root_dir,
            extension: extension.trim_start_matches('.').to_string(),
        })
    }

    pub(crate) fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// File name used for an already sanitized subject name.
    pub(crate) fn file_name(&self, subject_name: &str) -> String {
        format!("{}.{}", subject_name, self.extension)
    }

    pub(crate) fn path_for(&self, file_name: &str) -> PathBuf {
        self.root_dir.join(file_name)
    }

    pub(crate) fn file_exists(&self, file_name: &str) -> bool {
        self.path_for(file_name).exists()
    }

    /// Writes the whole image in one go, replacing any file with the same name.
    pub(crate) async fn save(&self, file_name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.path_for(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("Arknights_PRTS");

        let manager = DirectoryManager::new(&root, "png").unwrap();

        assert!(root.is_dir());
        assert_eq!(manager.root_dir(), root.as_path());
    }

    #[tokio::test]
    async fn test_save_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DirectoryManager::new(dir.path(), ".png").unwrap();
        let file_name = manager.file_name("阿米娅");

        assert_eq!(file_name, "阿米娅.png");
        assert!(!manager.file_exists(&file_name));

        let path = manager.save(&file_name, b"image").await.unwrap();

        assert!(manager.file_exists(&file_name));
        assert_eq!(fs::read(path).unwrap(), b"image");
    }
}
