use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use heft_core::models::{WeightEntry, parse_entry_date};
use heft_core::units::{WeightUnit, format_weight};

/// Parse a `--date` argument. `None` means now; keywords keep the current time of day.
pub(crate) fn parse_date(date_str: Option<String>) -> Result<DateTime<Utc>> {
    let now = Utc::now();
    match date_str {
        None => Ok(now),
        Some(s) => match s.trim().to_lowercase().as_str() {
            "today" | "now" => Ok(now),
            "yesterday" => Ok(now - Duration::days(1)),
            "tomorrow" => Ok(now + Duration::days(1)),
            _ => parse_entry_date(&s).with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD, an RFC 3339 timestamp, or today/yesterday/tomorrow")
            }),
        },
    }
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn print_weight_table(entries: &[WeightEntry], unit: WeightUnit) {
    #[derive(Tabled)]
    struct WeightRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "Note")]
        note: String,
    }

    let rows: Vec<WeightRow> = entries
        .iter()
        .map(|e| WeightRow {
            id: e.id,
            date: e.date.format("%Y-%m-%d %H:%M").to_string(),
            weight: format_weight(e.weight(), unit),
            note: e.note.as_deref().map(|n| truncate(n, 40)).unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
