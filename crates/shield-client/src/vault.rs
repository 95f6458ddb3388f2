//! Device-local private key vaults.
//!
//! A vault holds exactly one private key, the one belonging to the current
//! session. Nothing here talks to the network.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use zeroize::Zeroize;

use shield_core::{LocalKeyVault, PrivateKeyPem, Result};

/// Vault kept in process memory. Gone when the process exits.
#[derive(Debug, Default)]
pub struct MemoryVault {
    slot: RwLock<Option<PrivateKeyPem>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalKeyVault for MemoryVault {
    async fn set(&self, private_key: &PrivateKeyPem) -> Result<()> {
        *self.slot.write().await = Some(private_key.clone());
        Ok(())
    }

    async fn get(&self) -> Result<Option<PrivateKeyPem>> {
        Ok(self.slot.read().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.slot.write().await.take();
        Ok(())
    }
}

/// Vault backed by a single PEM file.
///
/// Writes go to a sibling temp file that is renamed into place, so a crash
/// mid-write leaves either the old key or the new one. On Unix the temp file
/// is created readable by the owner only, so the key is never exposed.
#[derive(Debug, Clone)]
pub struct FileVault {
    path: PathBuf,
}

impl FileVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LocalKeyVault for FileVault {
    async fn set(&self, private_key: &PrivateKeyPem) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // A leftover temp file may carry wider permissions; never reuse it.
        let temp = self.temp_path();
        remove_if_present(&temp).await?;
        let mut file = create_owner_only(&temp).await?;
        file.write_all(private_key.as_str().as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, &self.path).await?;

        info!(
            subsystem = "vault",
            component = "file_vault",
            op = "set",
            path = %self.path.display(),
            "Private key written to vault"
        );
        Ok(())
    }

    async fn get(&self) -> Result<Option<PrivateKeyPem>> {
        let mut text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let parsed = PrivateKeyPem::parse(&text);
        text.zeroize();
        Ok(Some(parsed?))
    }

    async fn clear(&self) -> Result<()> {
        remove_if_present(&self.temp_path()).await?;
        if remove_if_present(&self.path).await? {
            info!(
                subsystem = "vault",
                component = "file_vault",
                op = "clear",
                path = %self.path.display(),
                "Vault cleared"
            );
        } else {
            debug!(subsystem = "vault", op = "clear", "Vault already empty");
        }
        Ok(())
    }
}

async fn create_owner_only(path: &Path) -> Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    Ok(options.open(path).await?)
}

/// Returns whether a file was removed.
async fn remove_if_present(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shield_core::{Error, KeyCodec, KeySize};

    fn private_key() -> PrivateKeyPem {
        KeyCodec::new(KeySize::Rsa1024)
            .generate_key_pair()
            .unwrap()
            .private
    }

    #[tokio::test]
    async fn test_memory_vault_single_slot() {
        let vault = MemoryVault::new();
        assert!(vault.get().await.unwrap().is_none());

        let first = private_key();
        let second = private_key();
        vault.set(&first).await.unwrap();
        vault.set(&second).await.unwrap();
        assert_eq!(vault.get().await.unwrap(), Some(second));

        vault.clear().await.unwrap();
        assert!(vault.get().await.unwrap().is_none());
        vault.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_vault_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("private_key.pem");
        let key = private_key();

        FileVault::new(&path).set(&key).await.unwrap();
        let reopened = FileVault::new(&path);
        assert_eq!(reopened.get().await.unwrap(), Some(key));
        assert!(!reopened.temp_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_vault_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("private_key.pem"));
        vault.set(&private_key()).await.unwrap();

        let mode = std::fs::metadata(vault.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_temp_file_created_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("private_key.pem.tmp");
        drop(create_owner_only(&path).await.unwrap());

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_temp_file_replaced() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("private_key.pem"));
        std::fs::write(vault.temp_path(), "stale").unwrap();
        std::fs::set_permissions(vault.temp_path(), std::fs::Permissions::from_mode(0o644))
            .unwrap();

        let key = private_key();
        vault.set(&key).await.unwrap();
        assert_eq!(vault.get().await.unwrap(), Some(key));
        let mode = std::fs::metadata(vault.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!vault.temp_path().exists());
    }

    #[tokio::test]
    async fn test_clear_removes_leftover_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("private_key.pem"));
        std::fs::write(vault.temp_path(), private_key().as_str()).unwrap();

        vault.clear().await.unwrap();
        assert!(!vault.temp_path().exists());
    }

    #[tokio::test]
    async fn test_file_vault_clear() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::new(dir.path().join("private_key.pem"));

        vault.clear().await.unwrap();
        vault.set(&private_key()).await.unwrap();
        vault.clear().await.unwrap();
        assert!(vault.get().await.unwrap().is_none());
        assert!(!vault.path().exists());
    }

    #[tokio::test]
    async fn test_file_vault_rejects_public_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("private_key.pem");
        let public = KeyCodec::new(KeySize::Rsa1024)
            .generate_key_pair()
            .unwrap()
            .public;
        std::fs::write(&path, public.as_str()).unwrap();

        let err = FileVault::new(&path).get().await.unwrap_err();
        assert!(matches!(err, Error::MalformedKey(_)));
    }
}
