use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::units::WeightUnit;

// --- Weight tracking types ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub id: i64,
    pub uuid: String,
    pub date: DateTime<Utc>,
    pub weight_kg: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub note: Option<String>,
    pub created_at: String,
}

impl WeightEntry {
    /// The stored weight when it is a usable number.
    #[must_use]
    pub fn weight(&self) -> Option<f64> {
        self.weight_kg.is_finite().then_some(self.weight_kg)
    }
}

#[derive(Debug, Clone)]
pub struct NewWeightEntry {
    pub date: DateTime<Utc>,
    pub weight_kg: f64,
    pub note: Option<String>,
}

impl NewWeightEntry {
    #[must_use]
    pub fn new(date: DateTime<Utc>, weight_kg: f64, note: Option<String>) -> Self {
        Self {
            date,
            weight_kg,
            note: normalize_note(note),
        }
    }
}

/// Per-user configuration. Every field is optional apart from the display unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSettings {
    #[serde(default)]
    pub goal_weight_kg: Option<f64>,
    #[serde(default)]
    pub height_m: Option<f64>,
    #[serde(default)]
    pub units: WeightUnit,
}

/// Full state of one user: every entry plus the profile settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub entries: Vec<WeightEntry>,
    pub settings: ProfileSettings,
}

// --- Export / Import types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportWeightEntry {
    pub uuid: String,
    pub date: String,
    pub weight_kg: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub note: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

impl From<&WeightEntry> for ExportWeightEntry {
    fn from(e: &WeightEntry) -> Self {
        Self {
            uuid: e.uuid.clone(),
            date: e.date.to_rfc3339(),
            weight_kg: e.weight_kg,
            note: e.note.clone(),
            created_at: e.created_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportData {
    pub version: i64,
    pub exported_at: String,
    pub entries: Vec<ExportWeightEntry>,
    #[serde(default)]
    pub settings: ProfileSettings,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub entries_imported: usize,
    pub entries_skipped: usize,
    pub settings_updated: bool,
}

// --- Validation ---

/// Parse an entry timestamp: RFC 3339, or a bare `YYYY-MM-DD` meaning midnight UTC.
pub fn parse_entry_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| {
        format!("Invalid date '{s}'. Use YYYY-MM-DD or an RFC 3339 timestamp")
    })?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .context("midnight is always valid")?
        .and_utc())
}

/// Trim a free-text note, treating blank notes as absent.
#[must_use]
pub fn normalize_note(note: Option<String>) -> Option<String> {
    note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

pub fn validate_weight_kg(weight_kg: f64) -> Result<()> {
    if !weight_kg.is_finite() || weight_kg <= 0.0 {
        bail!("Weight must be greater than 0");
    }
    Ok(())
}

pub fn validate_height_m(height_m: f64) -> Result<()> {
    if !height_m.is_finite() || height_m <= 0.0 {
        bail!("Height must be greater than 0");
    }
    Ok(())
}

/// Validate profile settings before they are stored.
pub fn validate_settings(settings: &ProfileSettings) -> Result<()> {
    if let Some(goal) = settings.goal_weight_kg {
        if !goal.is_finite() || goal <= 0.0 {
            bail!("Goal weight must be greater than 0");
        }
    }
    if let Some(h) = settings.height_m {
        validate_height_m(h)?;
    }
    Ok(())
}

/// Validate an exported weight entry: weight > 0, parseable date, non-empty uuid.
pub fn validate_export_weight_entry(entry: &ExportWeightEntry) -> Result<()> {
    if entry.uuid.trim().is_empty() {
        bail!("uuid must not be empty");
    }
    validate_weight_kg(entry.weight_kg)?;
    parse_entry_date(&entry.date)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_export_entry() -> ExportWeightEntry {
        ExportWeightEntry {
            uuid: "abc".to_string(),
            date: "2025-01-15T07:30:00Z".to_string(),
            weight_kg: 75.0,
            note: None,
            created_at: "2025-01-15T07:30:00Z".to_string(),
        }
    }

    #[test]
    fn test_parse_entry_date_rfc3339() {
        let dt = parse_entry_date("2025-01-15T07:30:00+02:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 1, 15, 5, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_entry_date_plain_date() {
        let dt = parse_entry_date("2025-01-15").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_entry_date_invalid() {
        assert!(parse_entry_date("15/01/2025").is_err());
        assert!(parse_entry_date("").is_err());
    }

    #[test]
    fn test_normalize_note() {
        assert_eq!(normalize_note(None), None);
        assert_eq!(normalize_note(Some("   ".to_string())), None);
        assert_eq!(
            normalize_note(Some("  after run ".to_string())).as_deref(),
            Some("after run")
        );
    }

    #[test]
    fn test_weight_rejects_non_finite() {
        assert!(validate_weight_kg(70.0).is_ok());
        assert!(validate_weight_kg(0.0).is_err());
        assert!(validate_weight_kg(-1.0).is_err());
        assert!(validate_weight_kg(f64::NAN).is_err());
    }

    #[test]
    fn test_entry_weight_numeric() {
        let mut entry = WeightEntry {
            id: 1,
            uuid: "u".to_string(),
            date: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            weight_kg: 80.0,
            note: None,
            created_at: String::new(),
        };
        assert_eq!(entry.weight(), Some(80.0));
        entry.weight_kg = f64::NAN;
        assert_eq!(entry.weight(), None);
    }

    #[test]
    fn test_validate_settings() {
        assert!(validate_settings(&ProfileSettings::default()).is_ok());
        let bad_goal = ProfileSettings {
            goal_weight_kg: Some(0.0),
            ..ProfileSettings::default()
        };
        assert!(validate_settings(&bad_goal).is_err());
        let bad_height = ProfileSettings {
            height_m: Some(-1.7),
            ..ProfileSettings::default()
        };
        assert!(validate_settings(&bad_height).is_err());
    }

    #[test]
    fn test_settings_deserialize_defaults() {
        let s: ProfileSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s, ProfileSettings::default());
        assert_eq!(s.units, WeightUnit::Kg);
    }

    #[test]
    fn test_validate_export_weight_entry_valid() {
        assert!(validate_export_weight_entry(&sample_export_entry()).is_ok());
    }

    #[test]
    fn test_validate_export_weight_entry_zero_weight() {
        let entry = ExportWeightEntry {
            weight_kg: 0.0,
            ..sample_export_entry()
        };
        assert!(validate_export_weight_entry(&entry).is_err());
    }

    #[test]
    fn test_validate_export_weight_entry_invalid_date() {
        let entry = ExportWeightEntry {
            date: "yesterday-ish".to_string(),
            ..sample_export_entry()
        };
        assert!(validate_export_weight_entry(&entry).is_err());
    }

    #[test]
    fn test_validate_export_weight_entry_empty_uuid() {
        let entry = ExportWeightEntry {
            uuid: " ".to_string(),
            ..sample_export_entry()
        };
        assert!(validate_export_weight_entry(&entry).is_err());
    }
}
