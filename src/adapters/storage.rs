use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

/// Storage on the local file system. Relative paths resolve against `base_path`;
/// absolute paths are used as given.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(Path::new(path))
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new(".")
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let data = tokio::fs::read(self.full_path(path)).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }

    fn location(&self, path: &str) -> String {
        self.full_path(path).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read_creates_directories() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage
            .write_file("results/rabi_pulsed.tsv", b"laser\tsignal\n")
            .await
            .unwrap();
        let data = storage.read_file("results/rabi_pulsed.tsv").await.unwrap();
        assert_eq!(data, b"laser\tsignal\n");
        assert!(dir.path().join("results").is_dir());
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        let err = storage.read_file("absent.dat").await.unwrap_err();
        assert!(matches!(err, crate::utils::error::AnalysisError::IoError(_)));
    }

    #[test]
    fn test_location_keeps_absolute_paths() {
        let storage = LocalStorage::new("/data/run");
        assert_eq!(storage.location("out/fits.json"), "/data/run/out/fits.json");
        assert_eq!(storage.location("/tmp/x.dat"), "/tmp/x.dat");
    }
}
