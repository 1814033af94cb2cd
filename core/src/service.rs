use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::auth::UserId;
use crate::chart::{ChartSeries, build_chart};
use crate::db::Database;
use crate::history_csv::{self, CsvImportSummary};
use crate::models::{
    ExportData, ExportWeightEntry, ImportSummary, NewWeightEntry, ProfileSettings, UserSnapshot,
    WeightEntry, validate_export_weight_entry, validate_height_m, validate_settings,
    validate_weight_kg,
};
use crate::stats::{Milestone, WeightStats, compute_stats, detect_milestone};
use crate::units::{WeightUnit, convert_to_kg, height_cm_to_m};

pub const EXPORT_VERSION: i64 = 1;

/// Persistence collaborator. Everything is keyed by the owning user.
///
/// The CLI and server use the SQLite [`Database`]; tests and other front ends
/// can provide their own.
pub trait WeightStore: Send {
    fn load(&self, user: &UserId) -> Result<UserSnapshot>;
    fn insert_entry(&self, user: &UserId, entry: &NewWeightEntry) -> Result<WeightEntry>;
    /// Returns false when the user has no entry with this id.
    fn delete_entry(&self, user: &UserId, id: i64) -> Result<bool>;
    fn save_settings(&self, user: &UserId, settings: &ProfileSettings) -> Result<()>;
    /// Insert entries whose uuid is not yet stored; returns how many were inserted.
    fn import_entries(&self, user: &UserId, entries: &[ExportWeightEntry]) -> Result<usize>;
}

/// Live view of one user's data. Dropping it unsubscribes.
pub struct Subscription {
    rx: watch::Receiver<UserSnapshot>,
}

impl Subscription {
    /// The most recent snapshot, marking it as seen.
    pub fn current(&mut self) -> UserSnapshot {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next snapshot. Returns `None` once the service is gone.
    pub async fn next(&mut self) -> Option<UserSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Whether a snapshot has been published since the last one was read.
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedWeight {
    pub entry: WeightEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<Milestone>,
}

pub struct WeightService {
    store: Mutex<Box<dyn WeightStore>>,
    subscribers: Mutex<HashMap<UserId, watch::Sender<UserSnapshot>>>,
}

impl WeightService {
    #[must_use]
    pub fn new(store: Box<dyn WeightStore>) -> Self {
        Self {
            store: Mutex::new(store),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    pub fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::new(Box::new(Database::open(db_path)?)))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(Box::new(Database::open_in_memory()?)))
    }

    fn store(&self) -> MutexGuard<'_, Box<dyn WeightStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Snapshots ---

    pub fn snapshot(&self, user: &UserId) -> Result<UserSnapshot> {
        self.store().load(user)
    }

    /// Subscribe to `user`'s data. The first value is the current state; every
    /// later write for that user publishes a fresh snapshot.
    pub fn subscribe(&self, user: &UserId) -> Result<Subscription> {
        let snapshot = self.snapshot(user)?;
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let rx = match subscribers.get(user) {
            Some(tx) => {
                tx.send_replace(snapshot);
                tx.subscribe()
            }
            None => {
                let (tx, rx) = watch::channel(snapshot);
                subscribers.insert(user.clone(), tx);
                rx
            }
        };
        tracing::debug!(user = %user, "subscribed");
        Ok(Subscription { rx })
    }

    fn publish(&self, user: &UserId) -> Result<()> {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = subscribers.get(user) else {
            return Ok(());
        };
        if tx.receiver_count() == 0 {
            subscribers.remove(user);
            tracing::debug!(user = %user, "dropped subscription with no receivers");
            return Ok(());
        }
        let snapshot = self.snapshot(user)?;
        tx.send_replace(snapshot);
        Ok(())
    }

    // --- Weight ---

    /// Record a weight given in `unit`. `date` defaults to now.
    pub fn log_weight(
        &self,
        user: &UserId,
        value: f64,
        unit: WeightUnit,
        date: Option<DateTime<Utc>>,
        note: Option<String>,
    ) -> Result<LoggedWeight> {
        if !value.is_finite() || value <= 0.0 {
            bail!("Weight must be greater than 0");
        }
        let weight_kg = convert_to_kg(value, unit);
        validate_weight_kg(weight_kg)?;

        let entry = NewWeightEntry::new(date.unwrap_or_else(Utc::now), weight_kg, note);
        let logged = {
            let store = self.store();
            let before = store.load(user)?;
            let milestone =
                detect_milestone(&before.entries, weight_kg, before.settings.goal_weight_kg);
            let entry = store.insert_entry(user, &entry)?;
            LoggedWeight { entry, milestone }
        };
        tracing::info!(
            user = %user,
            id = logged.entry.id,
            weight_kg = logged.entry.weight_kg,
            "weight logged"
        );
        self.publish(user)?;
        Ok(logged)
    }

    /// Delete one entry by id. `Ok(false)` means there was nothing to delete.
    pub fn delete_weight(&self, user: &UserId, id: i64) -> Result<bool> {
        if !self.store().delete_entry(user, id)? {
            return Ok(false);
        }
        tracing::info!(user = %user, id, "weight deleted");
        self.publish(user)?;
        Ok(true)
    }

    /// Entries newest first.
    pub fn history(&self, user: &UserId, limit: Option<usize>) -> Result<Vec<WeightEntry>> {
        let mut entries = crate::stats::sort_entries(&self.snapshot(user)?.entries);
        entries.reverse();
        if let Some(n) = limit {
            entries.truncate(n);
        }
        Ok(entries)
    }

    // --- Profile settings ---

    pub fn settings(&self, user: &UserId) -> Result<ProfileSettings> {
        Ok(self.snapshot(user)?.settings)
    }

    pub fn update_settings(&self, user: &UserId, settings: &ProfileSettings) -> Result<()> {
        validate_settings(settings)?;
        self.store().save_settings(user, settings)?;
        self.publish(user)
    }

    fn modify_settings(
        &self,
        user: &UserId,
        change: impl FnOnce(&mut ProfileSettings),
    ) -> Result<ProfileSettings> {
        let mut settings = self.settings(user)?;
        change(&mut settings);
        self.update_settings(user, &settings)?;
        Ok(settings)
    }

    pub fn set_goal_weight(
        &self,
        user: &UserId,
        value: f64,
        unit: WeightUnit,
    ) -> Result<ProfileSettings> {
        if !value.is_finite() || value <= 0.0 {
            bail!("Goal weight must be greater than 0");
        }
        let kg = convert_to_kg(value, unit);
        self.modify_settings(user, |s| s.goal_weight_kg = Some(kg))
    }

    /// Returns whether a goal was set.
    pub fn clear_goal_weight(&self, user: &UserId) -> Result<bool> {
        let had_goal = self.settings(user)?.goal_weight_kg.is_some();
        self.modify_settings(user, |s| s.goal_weight_kg = None)?;
        Ok(had_goal)
    }

    pub fn set_height_cm(&self, user: &UserId, cm: f64) -> Result<ProfileSettings> {
        let height_m = height_cm_to_m(cm);
        validate_height_m(height_m)?;
        self.modify_settings(user, |s| s.height_m = Some(height_m))
    }

    /// Returns whether a height was set.
    pub fn clear_height(&self, user: &UserId) -> Result<bool> {
        let had_height = self.settings(user)?.height_m.is_some();
        self.modify_settings(user, |s| s.height_m = None)?;
        Ok(had_height)
    }

    pub fn set_units(&self, user: &UserId, units: WeightUnit) -> Result<ProfileSettings> {
        self.modify_settings(user, |s| s.units = units)
    }

    // --- Derived views ---

    pub fn stats(&self, user: &UserId) -> Result<WeightStats> {
        self.stats_at(user, Utc::now())
    }

    pub fn stats_at(&self, user: &UserId, now: DateTime<Utc>) -> Result<WeightStats> {
        let snapshot = self.snapshot(user)?;
        Ok(compute_stats(&snapshot.entries, &snapshot.settings, now))
    }

    pub fn chart(&self, user: &UserId) -> Result<ChartSeries> {
        let snapshot = self.snapshot(user)?;
        Ok(build_chart(&snapshot.entries, &snapshot.settings))
    }

    // --- Export / Import ---

    pub fn export(&self, user: &UserId) -> Result<ExportData> {
        let snapshot = self.snapshot(user)?;
        Ok(ExportData {
            version: EXPORT_VERSION,
            exported_at: Utc::now().to_rfc3339(),
            entries: crate::stats::sort_entries(&snapshot.entries)
                .iter()
                .map(ExportWeightEntry::from)
                .collect(),
            settings: snapshot.settings,
        })
    }

    /// Merge exported data into `user`'s account. Entries already present (by uuid)
    /// are skipped; settings from the export replace the current ones.
    pub fn import(&self, user: &UserId, data: &ExportData) -> Result<ImportSummary> {
        if data.version > EXPORT_VERSION {
            bail!(
                "Unsupported export version {} (newest supported: {EXPORT_VERSION})",
                data.version
            );
        }
        for entry in &data.entries {
            validate_export_weight_entry(entry)
                .with_context(|| format!("Invalid entry {}", entry.uuid))?;
        }
        validate_settings(&data.settings)?;

        let imported = {
            let store = self.store();
            let imported = store.import_entries(user, &data.entries)?;
            store.save_settings(user, &data.settings)?;
            imported
        };
        tracing::info!(user = %user, imported, "export imported");
        self.publish(user)?;
        Ok(ImportSummary {
            entries_imported: imported,
            entries_skipped: data.entries.len() - imported,
            settings_updated: true,
        })
    }

    pub fn export_csv<W: Write>(&self, user: &UserId, writer: W) -> Result<usize> {
        let snapshot = self.snapshot(user)?;
        let sorted = crate::stats::sort_entries(&snapshot.entries);
        history_csv::write_history_csv(&sorted, snapshot.settings.units, writer)?;
        Ok(sorted.len())
    }

    pub fn import_csv<R: Read>(
        &self,
        user: &UserId,
        reader: R,
        dry_run: bool,
    ) -> Result<CsvImportSummary> {
        let rows = history_csv::parse_history_csv(reader)?;
        let entries = history_csv::rows_to_entries(&rows);
        let mut summary = CsvImportSummary {
            rows_parsed: rows.len(),
            entries_imported: 0,
            first_date: rows.iter().map(|r| r.date).min(),
            last_date: rows.iter().map(|r| r.date).max(),
        };
        if dry_run || entries.is_empty() {
            return Ok(summary);
        }
        summary.entries_imported = self.store().import_entries(user, &entries)?;
        tracing::info!(user = %user, imported = summary.entries_imported, "csv imported");
        self.publish(user)?;
        Ok(summary)
    }
}
