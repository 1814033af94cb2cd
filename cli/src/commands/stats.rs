use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use heft_core::auth::UserId;
use heft_core::chart::ChartSeries;
use heft_core::service::WeightService;
use heft_core::stats::format_bmi;
use heft_core::units::{PLACEHOLDER, format_weight, round1};

use super::helpers::print_json;

const SPARK: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub(crate) fn cmd_stats(service: &WeightService, user: &UserId, json: bool) -> Result<()> {
    let stats = service.stats(user)?;
    if json {
        return print_json(&stats);
    }
    if stats.entry_count == 0 {
        eprintln!("No weight entries yet. Use `heft log <value>` to get started.");
        return Ok(());
    }

    let unit = service.settings(user)?.units;
    let w = |v: Option<f64>| format_weight(v, unit);
    let signed = |v: Option<f64>| match v {
        Some(v) if v > 0.0 => format!("+{}", format_weight(Some(v), unit)),
        other => format_weight(other, unit),
    };

    let bmi = match stats.bmi {
        Some(_) => format!("{} ({})", format_bmi(stats.bmi), stats.bmi_category.label()),
        None => PLACEHOLDER.to_string(),
    };
    let progress = stats
        .progress
        .map_or_else(|| PLACEHOLDER.to_string(), |p| format!("{:.0}%", round1(p)));

    let rows = [
        ("Current", w(stats.current)),
        ("Starting", w(stats.first)),
        ("Change", signed(stats.change)),
        ("Goal", w(stats.goal)),
        ("To goal", signed(stats.to_goal)),
        ("Progress", progress),
        ("BMI", bmi),
        ("7-day average", w(stats.weekly_avg)),
        ("30-day average", w(stats.monthly_avg)),
        ("Lowest", w(stats.lowest)),
        ("Highest", w(stats.highest)),
        ("Entries", stats.entry_count.to_string()),
    ];

    #[derive(Tabled)]
    struct StatRow {
        #[tabled(rename = "Stat")]
        label: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    let rows: Vec<StatRow> = rows
        .into_iter()
        .map(|(label, value)| StatRow { label, value })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_chart(service: &WeightService, user: &UserId, json: bool) -> Result<()> {
    let chart = service.chart(user)?;
    if json {
        return print_json(&chart);
    }
    if chart.points.is_empty() {
        eprintln!("Nothing to chart yet. Use `heft log <value>` to record your weight.");
        return Ok(());
    }

    let values: Vec<f64> = chart.points.iter().map(|p| p.value).collect();
    println!("{}", sparkline(&values));
    if let Some(goal) = chart.goal_line.first() {
        println!("Goal: {:.1} {}", goal.value, chart.unit);
    }

    let trend = aligned_trend(&chart);

    #[derive(Tabled)]
    struct ChartRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Weight")]
        weight: String,
        #[tabled(rename = "7-entry trend")]
        trend: String,
    }

    let rows: Vec<ChartRow> = chart
        .points
        .iter()
        .zip(&trend)
        .map(|(p, t)| ChartRow {
            date: p.date.format("%Y-%m-%d").to_string(),
            weight: format!("{:.1}", p.value),
            trend: t.map_or_else(|| PLACEHOLDER.to_string(), |t| format!("{t:.1}")),
        })
        .collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

/// Trend value for each chart point. The trend series ends on the last point, so it is
/// lined up by position from the end; dates can repeat and are not used.
fn aligned_trend(chart: &ChartSeries) -> Vec<Option<f64>> {
    let offset = chart.points.len().saturating_sub(chart.trend.len());
    (0..chart.points.len())
        .map(|i| i.checked_sub(offset).and_then(|j| chart.trend.get(j)).map(|p| p.value))
        .collect()
}

/// One block character per value, scaled between the series minimum and maximum.
#[allow(clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn sparkline(values: &[f64]) -> String {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    let top = (SPARK.len() - 1) as f64;
    values
        .iter()
        .map(|v| {
            if span > 0.0 {
                SPARK[((v - min) / span * top).round() as usize]
            } else {
                SPARK[SPARK.len() / 2]
            }
        })
        .collect()
}
