use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::ConfigLocator;
use crate::utils::lock;

use super::StoreError;

/// Opaque async key/value storage for secrets.
#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Read and decode a JSON value. Undecodable content reads back as `None`.
pub async fn get_json<T>(store: &dyn SecureStore, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
{
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            debug!(key, error = %err, "discarding undecodable secure-store entry");
            Ok(None)
        }
    }
}

pub async fn set_json<T>(store: &dyn SecureStore, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_string(value)?;
    store.set(key, &payload).await
}

/// Filesystem-backed store keeping one user-only file per key in the configuration directory.
pub struct FileSecureStore {
    locator: ConfigLocator,
}

impl FileSecureStore {
    pub fn new(locator: ConfigLocator) -> Self {
        Self { locator }
    }

    pub fn with_default_locator() -> Result<Self, StoreError> {
        Ok(Self::new(ConfigLocator::new()?))
    }

    async fn write_file(path: &Path, payload: &str) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await?;
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perm = file.metadata().await?.permissions();
            perm.set_mode(0o600);
            fs::set_permissions(path, perm).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl SecureStore for FileSecureStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.locator.secure_file(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry: StoredEntry = serde_json::from_str(&raw)?;
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.locator.secure_file(key);
        let entry = StoredEntry {
            version: 1,
            key: key.to_owned(),
            value: value.to_owned(),
            saved_at: Utc::now(),
        };
        let payload = serde_json::to_string_pretty(&entry)?;
        Self::write_file(&path, &payload).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.locator.secure_file(key);
        match fs::remove_file(path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    version: u32,
    key: String,
    value: String,
    saved_at: DateTime<Utc>,
}

/// In-process store used when no platform keychain is available.
#[derive(Debug, Default)]
pub struct MemorySecureStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        lock(&self.entries).insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn file_store(temp_dir: &TempDir) -> FileSecureStore {
        let locator = ConfigLocator::from_root(temp_dir.path().to_path_buf()).unwrap();
        FileSecureStore::new(locator)
    }

    #[tokio::test]
    async fn file_store_persists_values() {
        let temp_dir = TempDir::new().unwrap();
        let store = file_store(&temp_dir);
        store.set("auth_session_v1", "payload").await.unwrap();
        assert_eq!(
            store.get("auth_session_v1").await.unwrap().as_deref(),
            Some("payload")
        );
        store.delete("auth_session_v1").await.unwrap();
        assert!(store.get("auth_session_v1").await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = file_store(&temp_dir);
        store.set("secret", "value").await.unwrap();
        let path = temp_dir.path().join("secret.json");
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        file_store(&temp_dir).delete("missing").await.unwrap();
    }

    #[tokio::test]
    async fn undecodable_json_reads_as_none() {
        let store = MemorySecureStore::new();
        store.set("broken", "{not json").await.unwrap();
        let value: Option<serde_json::Value> = get_json(&store, "broken").await.unwrap();
        assert!(value.is_none());

        set_json(&store, "ok", &json!({ "a": 1 })).await.unwrap();
        let value: Option<serde_json::Value> = get_json(&store, "ok").await.unwrap();
        assert_eq!(value, Some(json!({ "a": 1 })));
    }
}
