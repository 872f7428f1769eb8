// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite preference backend.
//
// Schema:
//   preferences(
//     key    TEXT PRIMARY KEY,
//     kind   TEXT NOT NULL,   -- "string" | "bool" | "int" | "double" | "string_list"
//     value  TEXT NOT NULL    -- string lists are JSON arrays
//   )
//
// This is the plain persistence layer. Whatever the encrypted preference
// store hands it is written as-is.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, instrument};
use vigil_core::error::{Result, VigilError};
use vigil_core::types::PreferenceValue;

use crate::kv::KeyValueStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS preferences (
    key   TEXT PRIMARY KEY,
    kind  TEXT NOT NULL,
    value TEXT NOT NULL
);";

fn db_err(e: rusqlite::Error) -> VigilError {
    VigilError::Database(e.to_string())
}

fn encode(value: &PreferenceValue) -> Result<String> {
    Ok(match value {
        PreferenceValue::String(v) => v.clone(),
        PreferenceValue::Bool(v) => v.to_string(),
        PreferenceValue::Int(v) => v.to_string(),
        PreferenceValue::Double(v) => v.to_string(),
        PreferenceValue::StringList(v) => serde_json::to_string(v)?,
    })
}

fn decode(kind: &str, raw: String) -> Result<PreferenceValue> {
    let corrupt = |detail: &dyn std::fmt::Display| {
        VigilError::Database(format!("corrupt {kind} value: {detail}"))
    };
    Ok(match kind {
        "string" => PreferenceValue::String(raw),
        "bool" => PreferenceValue::Bool(raw.parse::<bool>().map_err(|e| corrupt(&e))?),
        "int" => PreferenceValue::Int(raw.parse::<i64>().map_err(|e| corrupt(&e))?),
        "double" => PreferenceValue::Double(raw.parse::<f64>().map_err(|e| corrupt(&e))?),
        "string_list" => PreferenceValue::StringList(serde_json::from_str(&raw)?),
        other => {
            return Err(VigilError::Database(format!(
                "unknown preference kind: {other}"
            )));
        }
    })
}

/// [`KeyValueStore`] backed by a single SQLite table.
pub struct SqliteKeyValueStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyValueStore {
    /// Open (or create) the preference database at `path` with WAL enabled.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("preference database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database (tests, ephemeral sessions).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!("in-memory preference database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| VigilError::Database("connection lock poisoned".into()))
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<PreferenceValue>> {
        let row: Option<(String, String)> = self
            .conn()?
            .query_row(
                "SELECT kind, value FROM preferences WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        row.map(|(kind, raw)| decode(&kind, raw)).transpose()
    }

    #[instrument(skip(self, value), fields(kind = value.kind()))]
    async fn set(&self, key: &str, value: PreferenceValue) -> Result<()> {
        let raw = encode(&value)?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO preferences (key, kind, value) VALUES (?1, ?2, ?3)",
                params![key, value.kind(), raw],
            )
            .map_err(db_err)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM preferences WHERE key = ?1", params![key])
            .map_err(db_err)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM preferences", [])
            .map_err(db_err)?;
        debug!("preferences cleared");
        Ok(())
    }

    async fn contains_key(&self, key: &str) -> Result<bool> {
        self.conn()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM preferences WHERE key = ?1)",
                params![key],
                |row| row.get(0),
            )
            .map_err(db_err)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key FROM preferences ORDER BY key ASC")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(db_err)?);
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_kind_survives_storage() {
        let store = SqliteKeyValueStore::open_in_memory().unwrap();
        let values = [
            ("s", PreferenceValue::String("héllo, wörld".into())),
            ("b", PreferenceValue::Bool(true)),
            ("i", PreferenceValue::Int(i64::MIN)),
            ("d", PreferenceValue::Double(0.1 + 0.2)),
            (
                "l",
                PreferenceValue::StringList(vec!["x".into(), String::new(), "z,\"q\"".into()]),
            ),
        ];
        for (key, value) in &values {
            store.set(key, value.clone()).await.unwrap();
        }
        for (key, value) in &values {
            assert_eq!(store.get(key).await.unwrap().as_ref(), Some(value));
        }
    }

    #[tokio::test]
    async fn overwrite_changes_kind() {
        let store = SqliteKeyValueStore::open_in_memory().unwrap();
        store.set_int("k", 1).await.unwrap();
        store.set_string("k", "one").await.unwrap();
        assert_eq!(store.get_int("k").await.unwrap(), None);
        assert_eq!(store.get_string("k").await.unwrap().as_deref(), Some("one"));
        assert_eq!(store.keys().await.unwrap(), vec!["k"]);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = SqliteKeyValueStore::open_in_memory().unwrap();
        assert_eq!(store.get("nope").await.unwrap(), None);
        assert!(!store.contains_key("nope").await.unwrap());
        store.remove("nope").await.unwrap();
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.db");
        {
            let store = SqliteKeyValueStore::open(&path).unwrap();
            store.set_bool("onboarded", true).await.unwrap();
            store.set_string("token", "abc").await.unwrap();
        }
        let store = SqliteKeyValueStore::open(&path).unwrap();
        assert_eq!(store.get_bool("onboarded").await.unwrap(), Some(true));
        assert_eq!(store.keys().await.unwrap(), vec!["onboarded", "token"]);

        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_row_is_an_error() {
        let store = SqliteKeyValueStore::open_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute(
                "INSERT INTO preferences (key, kind, value) VALUES ('n', 'int', 'seven')",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.get("n").await,
            Err(VigilError::Database(_))
        ));
    }
}
