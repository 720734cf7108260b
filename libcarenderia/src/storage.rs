//! Local persisted state
//!
//! The device keeps a handful of JSON-encoded strings under fixed keys: the
//! session tokens, the cached profile, the favorites list and the coupon
//! wallet mirror. Nothing here is authoritative; losing it only means the UI
//! starts from empty defaults.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use crate::error::{Result, StorageError};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_DATA_KEY: &str = "user_data";
pub const FAVORITES_KEY: &str = "favorites";
pub const COUPON_WALLET_KEY: &str = "claimed_coupons";

/// Key-value storage backend
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    fn backend_name(&self) -> &str;
}

/// Read and decode a JSON value
pub async fn load_json<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Result<Option<T>> {
    match storage.get(key).await? {
        Some(raw) => {
            let value = serde_json::from_str(&raw).map_err(StorageError::Serialization)?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Encode and write a JSON value
pub async fn save_json<T: Serialize + ?Sized>(storage: &dyn Storage, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value).map_err(StorageError::Serialization)?;
    storage.set(key, &raw).await
}

/// SQLite-backed storage (one `kv_entries` table)
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StorageError::IoError)?;
            }
        }

        // Forward slashes keep the URL valid on Windows; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(StorageError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StorageError::MigrationError)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::SqlxError)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(StorageError::SqlxError)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(StorageError::SqlxError)?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}

/// Volatile storage
///
/// Used by tests, and as the fallback when the on-disk store cannot be opened.
/// `set_fail_writes(true)` makes every write fail, to exercise the stores'
/// swallow-and-log path.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory storage is read-only",
            ))
            .into());
        }
        Ok(())
    }

    fn poisoned() -> StorageError {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            "memory storage lock poisoned",
        ))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_set_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("store.db");
        let storage = SqliteStorage::new(db_path.to_str().unwrap()).await.unwrap();

        assert_eq!(storage.get(FAVORITES_KEY).await.unwrap(), None);

        storage.set(FAVORITES_KEY, "[1,2]").await.unwrap();
        storage.set(FAVORITES_KEY, "[1,2,3]").await.unwrap();
        assert_eq!(
            storage.get(FAVORITES_KEY).await.unwrap().as_deref(),
            Some("[1,2,3]")
        );

        storage.remove(FAVORITES_KEY).await.unwrap();
        storage.remove(FAVORITES_KEY).await.unwrap();
        assert_eq!(storage.get(FAVORITES_KEY).await.unwrap(), None);
        assert_eq!(storage.backend_name(), "sqlite");
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("store.db");
        let path = db_path.to_str().unwrap();

        {
            let storage = SqliteStorage::new(path).await.unwrap();
            save_json(&storage, USER_DATA_KEY, &vec!["juan"]).await.unwrap();
        }

        let storage = SqliteStorage::new(path).await.unwrap();
        let loaded: Option<Vec<String>> = load_json(&storage, USER_DATA_KEY).await.unwrap();
        assert_eq!(loaded, Some(vec!["juan".to_string()]));
    }

    #[tokio::test]
    async fn test_load_json_reports_corrupt_values() {
        let storage = MemoryStorage::new();
        storage.set(FAVORITES_KEY, "{not json").await.unwrap();

        let result: Result<Option<Vec<i64>>> = load_json(&storage, FAVORITES_KEY).await;
        assert!(matches!(
            result,
            Err(crate::error::StorefrontError::Storage(StorageError::Serialization(_)))
        ));
    }

    #[tokio::test]
    async fn test_memory_storage_write_failures() {
        let storage = MemoryStorage::new();
        storage.set(ACCESS_TOKEN_KEY, "abc").await.unwrap();

        storage.set_fail_writes(true);
        assert!(storage.set(ACCESS_TOKEN_KEY, "def").await.is_err());
        assert!(storage.remove(ACCESS_TOKEN_KEY).await.is_err());
        // Reads still work
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).await.unwrap().as_deref(), Some("abc"));

        storage.set_fail_writes(false);
        storage.remove(ACCESS_TOKEN_KEY).await.unwrap();
        assert!(!storage.contains_key(ACCESS_TOKEN_KEY));
    }
}
