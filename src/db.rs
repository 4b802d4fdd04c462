use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

/// String key/value persistence with local-storage semantics: independent
/// keys, last write wins, no multi-key atomicity.
pub trait PreferenceStore {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<()>;
}

impl PreferenceStore for HashMap<String, String> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        self.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StoredItem {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS local_storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn list_items(&self) -> Result<Vec<StoredItem>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, updated_at FROM local_storage ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredItem {
                key: row.get(0)?,
                value: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl PreferenceStore for Database {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("failed to read stored key {key}"))?;
        Ok(value)
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                r#"
                INSERT INTO local_storage (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
                params![key, value, now],
            )
            .with_context(|| format!("failed to write stored key {key}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = Database::open(&dir.path().join("nested").join("aniplay.db")).expect("open db");
        db.migrate().expect("migrate");
        (dir, db)
    }

    #[test]
    fn missing_key_reads_as_none() {
        let (_dir, db) = open_temp();
        assert_eq!(db.get_item("videoQuality").expect("read"), None);
    }

    #[test]
    fn set_item_overwrites_previous_value() {
        let (_dir, mut db) = open_temp();
        db.set_item("videoQuality", "1080p").expect("write");
        db.set_item("videoQuality", "720p").expect("overwrite");

        assert_eq!(
            db.get_item("videoQuality").expect("read").as_deref(),
            Some("720p")
        );
        let items = db.list_items().expect("list");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "videoQuality");
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("aniplay.db");
        {
            let mut db = Database::open(&path).expect("open db");
            db.migrate().expect("migrate");
            db.set_item("playerVolume", "65").expect("write");
        }

        let db = Database::open(&path).expect("reopen db");
        db.migrate().expect("migrate again");
        assert_eq!(
            db.get_item("playerVolume").expect("read").as_deref(),
            Some("65")
        );
    }
}
