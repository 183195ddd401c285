//! File-backed Secret Storage using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// File-based secure storage implementation
///
/// Stores each secret as `<dir>/<key>.json`. Writes go to a temporary file
/// that is renamed over the target, so a crash mid-write never leaves a
/// truncated record behind. On Unix the files are created with mode `0600`.
///
/// This is the default desktop store injected by `ClientConfig` under the
/// `desktop-shims` feature.
pub struct FileSecureStore {
    dir: PathBuf,
}

impl FileSecureStore {
    /// Create a store rooted at the platform data directory
    pub fn new() -> Self {
        let dir = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join("haki-client");

        Self { dir }
    }

    /// Create a store rooted at a custom directory
    pub fn with_directory(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    /// Map a key onto a file name, replacing anything outside `[A-Za-z0-9_.-]`.
    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }

    async fn ensure_dir(&self) -> Result<()> {
        if fs::try_exists(&self.dir).await.map_err(BridgeError::Io)? {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).await.map_err(BridgeError::Io)?;
        debug!(path = ?self.dir, "Created secret storage directory");
        Ok(())
    }

    async fn write_atomic(&self, target: &Path, value: &[u8]) -> Result<()> {
        let tmp = self.dir.join(format!(".{}.tmp", Uuid::new_v4()));

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp).await.map_err(BridgeError::Io)?;
        let written = async {
            file.write_all(value).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(BridgeError::Io(e));
        }
        drop(file);

        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(BridgeError::Io(e));
        }
        Ok(())
    }
}

impl Default for FileSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        self.ensure_dir().await?;
        let path = self.path_for(key);
        self.write_atomic(&path, value).await?;

        debug!(key = key, "Stored secret on disk");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(data) => {
                debug!(key = key, "Retrieved secret from disk");
                Ok(Some(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => {
                debug!(key = key, "Deleted secret from disk");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key = key, "Secret not found (already deleted)");
                Ok(())
            }
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn has_secret(&self, key: &str) -> Result<bool> {
        fs::try_exists(self.path_for(key))
            .await
            .map_err(BridgeError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_get_delete_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileSecureStore::with_directory(dir.path().join("nested"));

        assert_eq!(store.get_secret("user").await.unwrap(), None);

        store.set_secret("user", b"{\"email\":\"a@b.c\"}").await.unwrap();
        assert!(store.has_secret("user").await.unwrap());
        assert_eq!(
            store.get_secret("user").await.unwrap(),
            Some(b"{\"email\":\"a@b.c\"}".to_vec())
        );

        store.delete_secret("user").await.unwrap();
        assert!(!store.has_secret("user").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let dir = TempDir::new().unwrap();
        let store = FileSecureStore::with_directory(dir.path());

        store.set_secret("user", b"first").await.unwrap();
        store.set_secret("user", b"second").await.unwrap();

        assert_eq!(
            store.get_secret("user").await.unwrap(),
            Some(b"second".to_vec())
        );
        // Only the record itself remains; temp files are renamed away.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = FileSecureStore::with_directory(dir.path());

        store.delete_secret("never-written").await.unwrap();
    }

    #[test]
    fn test_key_cannot_escape_directory() {
        let store = FileSecureStore::with_directory("/tmp/haki");
        let path = store.path_for("../../etc/passwd");

        assert_eq!(path.parent(), Some(Path::new("/tmp/haki")));
        assert_eq!(path.file_name().unwrap(), ".._.._etc_passwd.json");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileSecureStore::with_directory(dir.path());
        store.set_secret("user", b"secret").await.unwrap();

        let mode = std::fs::metadata(store.path_for("user"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
