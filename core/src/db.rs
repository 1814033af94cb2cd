use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::auth::UserId;
use crate::models::{
    ExportWeightEntry, NewWeightEntry, ProfileSettings, UserSnapshot, WeightEntry,
    normalize_note, parse_entry_date,
};
use crate::service::WeightStore;
use crate::units::WeightUnit;

const GOAL_WEIGHT_KEY: &str = "goal_weight_kg";
const HEIGHT_KEY: &str = "height_m";
const UNITS_KEY: &str = "units";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS weight_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    weight_kg REAL NOT NULL,
                    note TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_weight_entries_user ON weight_entries(user_id);

                CREATE TABLE IF NOT EXISTS user_settings (
                    user_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, key)
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            // uuids are unique per user, so one account can import another's export
            self.conn.execute_batch(
                "CREATE TABLE weight_entries_new (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    date TEXT NOT NULL,
                    weight_kg REAL NOT NULL,
                    note TEXT,
                    created_at TEXT NOT NULL,
                    UNIQUE (user_id, uuid)
                );

                INSERT INTO weight_entries_new (id, uuid, user_id, date, weight_kg, note, created_at)
                    SELECT id, uuid, user_id, date, weight_kg, note, created_at FROM weight_entries;

                DROP TABLE weight_entries;
                ALTER TABLE weight_entries_new RENAME TO weight_entries;

                CREATE INDEX IF NOT EXISTS idx_weight_entries_user ON weight_entries(user_id);

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn weight_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightEntry> {
        let date_str: String = row.get(2)?;
        let date = DateTime::parse_from_rfc3339(&date_str)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);
        Ok(WeightEntry {
            id: row.get(0)?,
            uuid: row.get(1)?,
            date,
            weight_kg: row.get(3)?,
            note: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // --- Weight Entries ---

    pub fn insert_weight(&self, user: &UserId, entry: &NewWeightEntry) -> Result<WeightEntry> {
        let now = Utc::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.insert_weight_row(user, &uuid, entry.date, entry.weight_kg, entry.note.as_deref(), &now)?;
        let id = self.conn.last_insert_rowid();
        self.get_weight_entry(user, id)?
            .context("Weight entry not found after insert")
    }

    fn insert_weight_row(
        &self,
        user: &UserId,
        uuid: &str,
        date: DateTime<Utc>,
        weight_kg: f64,
        note: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO weight_entries (uuid, user_id, date, weight_kg, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                uuid,
                user.as_str(),
                date.to_rfc3339(),
                weight_kg,
                note,
                created_at
            ],
        )?;
        Ok(())
    }

    pub fn get_weight_entry(&self, user: &UserId, id: i64) -> Result<Option<WeightEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT id, uuid, date, weight_kg, note, created_at
                 FROM weight_entries WHERE user_id = ?1 AND id = ?2",
                params![user.as_str(), id],
                Self::weight_entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Every entry for `user`, in insertion order.
    pub fn list_weights(&self, user: &UserId) -> Result<Vec<WeightEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, date, weight_kg, note, created_at
             FROM weight_entries WHERE user_id = ?1 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![user.as_str()], Self::weight_entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Returns false when the user has no entry with this id.
    pub fn delete_weight(&self, user: &UserId, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM weight_entries WHERE user_id = ?1 AND id = ?2",
            params![user.as_str(), id],
        )?;
        Ok(rows > 0)
    }

    fn weight_uuid_exists(&self, user: &UserId, uuid: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM weight_entries WHERE user_id = ?1 AND uuid = ?2",
                params![user.as_str(), uuid],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert exported entries, skipping any uuid already stored. Returns the number inserted.
    pub fn import_weights(&self, user: &UserId, entries: &[ExportWeightEntry]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut imported = 0;
        for e in entries {
            if self.weight_uuid_exists(user, &e.uuid)? {
                continue;
            }
            let date = parse_entry_date(&e.date)?;
            let created_at = if e.created_at.is_empty() {
                Utc::now().to_rfc3339()
            } else {
                e.created_at.clone()
            };
            let note = normalize_note(e.note.clone());
            self.insert_weight_row(user, &e.uuid, date, e.weight_kg, note.as_deref(), &created_at)?;
            imported += 1;
        }
        tx.commit()?;
        Ok(imported)
    }

    // --- User Settings ---

    pub fn set_setting(&self, user: &UserId, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (user_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![user.as_str(), key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, user: &UserId, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM user_settings WHERE user_id = ?1 AND key = ?2",
                params![user.as_str(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn delete_setting(&self, user: &UserId, key: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM user_settings WHERE user_id = ?1 AND key = ?2",
            params![user.as_str(), key],
        )?;
        Ok(rows > 0)
    }

    fn get_f64_setting(&self, user: &UserId, key: &str) -> Result<Option<f64>> {
        match self.get_setting(user, key)? {
            Some(v) => Ok(Some(
                v.parse::<f64>()
                    .with_context(|| format!("Invalid stored value for '{key}': {v}"))?,
            )),
            None => Ok(None),
        }
    }

    fn put_f64_setting(&self, user: &UserId, key: &str, value: Option<f64>) -> Result<()> {
        match value {
            Some(v) => self.set_setting(user, key, &v.to_string()),
            None => self.delete_setting(user, key).map(|_| ()),
        }
    }

    pub fn load_settings(&self, user: &UserId) -> Result<ProfileSettings> {
        let units = match self.get_setting(user, UNITS_KEY)? {
            Some(v) => v.parse::<WeightUnit>()?,
            None => WeightUnit::default(),
        };
        Ok(ProfileSettings {
            goal_weight_kg: self.get_f64_setting(user, GOAL_WEIGHT_KEY)?,
            height_m: self.get_f64_setting(user, HEIGHT_KEY)?,
            units,
        })
    }

    pub fn save_settings(&self, user: &UserId, settings: &ProfileSettings) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.put_f64_setting(user, GOAL_WEIGHT_KEY, settings.goal_weight_kg)?;
        self.put_f64_setting(user, HEIGHT_KEY, settings.height_m)?;
        self.set_setting(user, UNITS_KEY, settings.units.as_str())?;
        tx.commit()?;
        Ok(())
    }
}

impl WeightStore for Database {
    fn load(&self, user: &UserId) -> Result<UserSnapshot> {
        Ok(UserSnapshot {
            entries: self.list_weights(user)?,
            settings: self.load_settings(user)?,
        })
    }

    fn insert_entry(&self, user: &UserId, entry: &NewWeightEntry) -> Result<WeightEntry> {
        self.insert_weight(user, entry)
    }

    fn delete_entry(&self, user: &UserId, id: i64) -> Result<bool> {
        self.delete_weight(user, id)
    }

    fn save_settings(&self, user: &UserId, settings: &ProfileSettings) -> Result<()> {
        Database::save_settings(self, user, settings)
    }

    fn import_entries(&self, user: &UserId, entries: &[ExportWeightEntry]) -> Result<usize> {
        self.import_weights(user, entries)
    }
}
