use std::io::{Read, Write};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{ExportWeightEntry, WeightEntry, normalize_note, parse_entry_date};
use crate::units::{WeightUnit, convert_from_kg, convert_to_kg};

pub const HEADERS: [&str; 4] = ["Date", "Weight", "Unit", "Note"];

/// A single row parsed from a history CSV, already converted to kilograms.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    /// 1-based line number in the source file.
    pub line: usize,
    pub date: DateTime<Utc>,
    pub weight_kg: f64,
    pub note: Option<String>,
}

/// What a CSV import would do / did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CsvImportSummary {
    pub rows_parsed: usize,
    pub entries_imported: usize,
    pub first_date: Option<DateTime<Utc>>,
    pub last_date: Option<DateTime<Utc>>,
}

/// Parse a weight history CSV from any reader.
///
/// Expected header: `Date,Weight,Unit,Note`. Only `Date` and `Weight` are
/// required; a missing or empty unit means kilograms.
pub fn parse_history_csv<R: Read>(reader: R) -> Result<Vec<CsvRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };

    let idx_date = col("Date").context("Missing required column: Date")?;
    let idx_weight = col("Weight").context("Missing required column: Weight")?;
    let idx_unit = col("Unit");
    let idx_note = col("Note");

    let mut rows = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("Failed to parse CSV row {}", i + 2))?;
        // Blank lines are skipped by the reader, so take the line from the record itself
        let line = record
            .position()
            .and_then(|p| usize::try_from(p.line()).ok())
            .unwrap_or(i + 2);
        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("").trim();

        let date = field(Some(idx_date));
        let weight = field(Some(idx_weight));
        if date.is_empty() && weight.is_empty() {
            continue;
        }

        let date = parse_entry_date(date).with_context(|| format!("Line {line}"))?;
        let unit = match field(idx_unit) {
            "" => WeightUnit::Kg,
            u => u.parse::<WeightUnit>().with_context(|| format!("Line {line}"))?,
        };
        let value: f64 = weight
            .parse()
            .with_context(|| format!("Line {line}: invalid weight '{weight}'"))?;
        if !value.is_finite() || value <= 0.0 {
            bail!("Line {line}: weight must be greater than 0");
        }

        rows.push(CsvRow {
            line,
            date,
            weight_kg: convert_to_kg(value, unit),
            note: normalize_note(Some(field(idx_note).to_string())),
        });
    }

    Ok(rows)
}

/// Turn parsed rows into importable entries, each with a fresh uuid.
#[must_use]
pub fn rows_to_entries(rows: &[CsvRow]) -> Vec<ExportWeightEntry> {
    let now = Utc::now().to_rfc3339();
    rows.iter()
        .map(|r| ExportWeightEntry {
            uuid: Uuid::new_v4().to_string(),
            date: r.date.to_rfc3339(),
            weight_kg: r.weight_kg,
            note: r.note.clone(),
            created_at: now.clone(),
        })
        .collect()
}

/// Write entries as a history CSV with weights in `unit`.
pub fn write_history_csv<W: Write>(
    entries: &[WeightEntry],
    unit: WeightUnit,
    writer: W,
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(HEADERS)?;
    for e in entries {
        wtr.write_record([
            e.date.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            convert_from_kg(e.weight_kg, unit).to_string(),
            unit.as_str().to_string(),
            e.note.clone().unwrap_or_default(),
        ])?;
    }
    wtr.flush().context("Failed to write CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_basic_csv() {
        let csv = "Date,Weight,Unit,Note\n\
                   2025-01-15,80.5,kg,Morning\n\
                   2025-01-16T07:30:00Z,176.4,lbs,\n";
        let rows = parse_history_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].date, Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap());
        assert!((rows[0].weight_kg - 80.5).abs() < 1e-9);
        assert_eq!(rows[0].note.as_deref(), Some("Morning"));
        assert!((rows[1].weight_kg - 80.0).abs() < 0.05);
        assert!(rows[1].note.is_none());
    }

    #[test]
    fn test_parse_unit_column_optional() {
        let csv = "date,weight\n2025-01-15,70\n";
        let rows = parse_history_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].weight_kg - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_skips_blank_rows() {
        let csv = "Date,Weight,Unit,Note\n,,,\n2025-01-15,70,kg,\n";
        let rows = parse_history_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 3);
    }

    #[test]
    fn test_parse_rejects_bad_rows_with_line_number() {
        let bad_weight = "Date,Weight\n2025-01-15,70\n2025-01-16,heavy\n";
        let err = parse_history_csv(bad_weight.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("Line 3"));

        let after_blanks = "Date,Weight\n2025-01-01,80\n\n\n2025-01-02,abc\n";
        let err = parse_history_csv(after_blanks.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("Line 5"));

        let negative = "Date,Weight\n2025-01-15,-70\n";
        let err = parse_history_csv(negative.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("Line 2"));

        let bad_date = "Date,Weight\n15/01/2025,70\n";
        let err = parse_history_csv(bad_date.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("Line 2"));

        let bad_unit = "Date,Weight,Unit\n2025-01-15,70,stone\n";
        let err = parse_history_csv(bad_unit.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid unit"));
    }

    #[test]
    fn test_parse_missing_required_column() {
        let csv = "Date,Note\n2025-01-15,hi\n";
        let err = parse_history_csv(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Weight"));
    }

    #[test]
    fn test_write_history_csv_in_display_unit() {
        let date = Utc.with_ymd_and_hms(2025, 2, 1, 6, 0, 0).unwrap();
        let entries = vec![WeightEntry {
            id: 1,
            uuid: "u1".to_string(),
            date,
            weight_kg: 100.0,
            note: Some("new, scale".to_string()),
            created_at: date.to_rfc3339(),
        }];
        let mut buf = Vec::new();
        write_history_csv(&entries, WeightUnit::Kg, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("Date,Weight,Unit,Note"));
        assert_eq!(
            lines.next(),
            Some("2025-02-01T06:00:00Z,100,kg,\"new, scale\"")
        );

        let mut buf = Vec::new();
        write_history_csv(&entries, WeightUnit::Lbs, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains(",lbs,"));

        let rows = parse_history_csv(out.as_bytes()).unwrap();
        assert!((rows[0].weight_kg - 100.0).abs() < 1e-9);
        assert_eq!(rows[0].date, date);
    }

    #[test]
    fn test_write_history_csv_keeps_subsecond_dates() {
        let date = Utc.with_ymd_and_hms(2025, 2, 1, 6, 0, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        let entries = vec![WeightEntry {
            id: 1,
            uuid: "u1".to_string(),
            date,
            weight_kg: 80.0,
            note: None,
            created_at: date.to_rfc3339(),
        }];
        let mut buf = Vec::new();
        write_history_csv(&entries, WeightUnit::Kg, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("2025-02-01T06:00:00.250Z"));

        let rows = parse_history_csv(out.as_bytes()).unwrap();
        assert_eq!(rows[0].date, date);
    }

    #[test]
    fn test_rows_to_entries_assigns_uuids() {
        let rows = parse_history_csv("Date,Weight\n2025-01-15,70\n2025-01-15,71\n".as_bytes()).unwrap();
        let entries = rows_to_entries(&rows);
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].uuid, entries[1].uuid);
        assert_eq!(entries[0].date, "2025-01-15T00:00:00+00:00");
    }
}
