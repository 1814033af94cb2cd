use anyhow::{Result, bail};
use chrono::{Duration, Utc};

use heft_core::auth::UserId;
use heft_core::service::WeightService;
use heft_core::stats::Milestone;
use heft_core::units::{WeightUnit, format_weight};

use super::helpers::{parse_date, print_json, print_weight_table};

pub(crate) fn cmd_log(
    service: &WeightService,
    user: &UserId,
    value: f64,
    unit: Option<&str>,
    date: Option<String>,
    note: Option<String>,
    json: bool,
) -> Result<()> {
    let settings = service.settings(user)?;
    let unit = match unit {
        Some(u) => u.parse::<WeightUnit>()?,
        None => settings.units,
    };
    let date = parse_date(date)?;

    let logged = service.log_weight(user, value, unit, Some(date), note)?;

    if json {
        return print_json(&logged);
    }

    let entry = &logged.entry;
    println!(
        "Logged {} for {} (id {})",
        format_weight(entry.weight(), settings.units),
        entry.date.format("%Y-%m-%d"),
        entry.id
    );
    if let Some(ref n) = entry.note {
        println!("  Note: {n}");
    }
    match logged.milestone {
        Some(Milestone::GoalReached) => println!("Goal reached!"),
        Some(Milestone::NewLow) => println!("New lowest weight!"),
        None => {}
    }
    Ok(())
}

pub(crate) fn cmd_history(
    service: &WeightService,
    user: &UserId,
    days: Option<u32>,
    json: bool,
) -> Result<()> {
    let mut entries = service.history(user, None)?;
    if let Some(days) = days {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        entries.retain(|e| e.date >= cutoff);
    }

    if json {
        print_json(&entries)
    } else if entries.is_empty() {
        eprintln!("No weight entries found. Use `heft log <value>` to record your weight.");
        Ok(())
    } else {
        let units = service.settings(user)?.units;
        print_weight_table(&entries, units);
        Ok(())
    }
}

pub(crate) fn cmd_delete(service: &WeightService, user: &UserId, id: i64, json: bool) -> Result<()> {
    if !service.delete_weight(user, id)? {
        bail!("Weight entry {id} not found");
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted weight entry {id}");
    }
    Ok(())
}
