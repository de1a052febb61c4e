//! Settings repository — simple key-value store for dashboard preferences

use crate::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

const MAX_KEY_LEN: usize = 128;

/// A stored setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SettingRecord {
    pub key: String,
    pub value: String,
    /// Unix seconds of the last write
    pub updated_at: i64,
}

/// Keys are 1–128 chars of `[A-Za-z0-9_.-]`
pub fn validate_key(key: &str) -> DbResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(DbError::InvalidKey(key.to_string()))
    }
}

/// Repository for the `settings` table
pub struct SettingsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SettingsRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<SettingRecord>> {
        validate_key(key)?;
        let record = sqlx::query_as::<_, SettingRecord>(
            "SELECT key, value, updated_at FROM settings WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// Insert or overwrite a setting, returning the stored row
    pub async fn set(&self, key: &str, value: &str) -> DbResult<SettingRecord> {
        validate_key(key)?;
        let record = sqlx::query_as::<_, SettingRecord>(
            r#"INSERT INTO settings (key, value, updated_at)
               VALUES (?1, ?2, strftime('%s', 'now'))
               ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at
               RETURNING key, value, updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .fetch_one(self.pool)
        .await?;

        Ok(record)
    }

    /// Returns true if a row was removed
    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        validate_key(key)?;
        let result = sqlx::query("DELETE FROM settings WHERE key = ?1")
            .bind(key)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All settings ordered by key
    pub async fn list(&self) -> DbResult<Vec<SettingRecord>> {
        let records = sqlx::query_as::<_, SettingRecord>(
            "SELECT key, value, updated_at FROM settings ORDER BY key",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("sound.enabled").is_ok());
        assert!(validate_key("default_fee-rate").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key(&"k".repeat(129)).is_err());
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let db = Database::in_memory().await.unwrap();
        let repo = SettingsRepository::new(db.pool());

        assert!(repo.get("theme").await.unwrap().is_none());
        let saved = repo.set("theme", "\"dark\"").await.unwrap();
        assert_eq!(saved.value, "\"dark\"");
        assert!(saved.updated_at > 0);

        let loaded = repo.get("theme").await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let db = Database::in_memory().await.unwrap();
        let repo = SettingsRepository::new(db.pool());

        repo.set("sound.enabled", "true").await.unwrap();
        let updated = repo.set("sound.enabled", "false").await.unwrap();
        assert_eq!(updated.key, "sound.enabled");
        assert_eq!(updated.value, "false");

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value, "false");
    }

    #[tokio::test]
    async fn test_delete_and_list_order() {
        let db = Database::in_memory().await.unwrap();
        let repo = SettingsRepository::new(db.pool());

        repo.set("b", "2").await.unwrap();
        repo.set("a", "1").await.unwrap();
        let keys: Vec<String> = repo.list().await.unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        assert!(repo.delete("a").await.unwrap());
        assert!(!repo.delete("a").await.unwrap());
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let db = Database::in_memory().await.unwrap();
        let repo = SettingsRepository::new(db.pool());
        assert!(matches!(
            repo.set("bad key", "x").await,
            Err(DbError::InvalidKey(_))
        ));
    }
}
