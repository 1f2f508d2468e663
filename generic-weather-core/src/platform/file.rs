use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;

use super::{Storage, StorageError, check_storage_len};

/// Storage backed by one file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage under the platform data directory, created if missing.
    pub fn open_default() -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "generic-weather", "generic-weather")
            .ok_or_else(|| anyhow!("Could not determine platform data directory"))?;
        let dir = dirs.data_dir().join("records");

        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory: {}", dir.display()))?;

        Ok(Self::new(dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: u32) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }
}

impl Storage for FileStorage {
    fn exists(&self, key: u32) -> bool {
        self.path_for(key).is_file()
    }

    fn read(&self, key: u32) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: u32, data: &[u8]) -> Result<(), StorageError> {
        check_storage_len(data)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(tmp.path());

        assert!(!storage.exists(5));
        assert_eq!(storage.read(5).unwrap(), None);

        storage.write(5, b"abc").unwrap();
        assert!(storage.exists(5));
        assert_eq!(storage.read(5).unwrap(), Some(b"abc".to_vec()));
    }

    #[test]
    fn creates_missing_directory_on_write() {
        let tmp = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(tmp.path().join("nested").join("dir"));

        storage.write(1, &[1, 2, 3]).unwrap();
        assert!(storage.dir().join("1.bin").is_file());
    }

    #[test]
    fn rejects_oversized_values() {
        let tmp = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(tmp.path());

        let err = storage.write(1, &[0u8; 300]).unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { len: 300, .. }));
    }
}
