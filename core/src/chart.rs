use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ProfileSettings, WeightEntry};
use crate::stats::{sort_entries, trend_series};
use crate::units::{WeightUnit, convert_from_kg};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Chart-ready series, all values in the display unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub unit: WeightUnit,
    pub points: Vec<ChartPoint>,
    /// Flat line at the goal spanning the first and last point.
    pub goal_line: Vec<ChartPoint>,
    pub trend: Vec<ChartPoint>,
}

#[must_use]
pub fn build_chart(entries: &[WeightEntry], settings: &ProfileSettings) -> ChartSeries {
    let unit = settings.units;
    let sorted = sort_entries(entries);

    let points: Vec<ChartPoint> = sorted
        .iter()
        .filter_map(|e| {
            e.weight().map(|kg| ChartPoint {
                date: e.date,
                value: convert_from_kg(kg, unit),
                note: e.note.clone(),
            })
        })
        .collect();

    let goal_line = match (settings.goal_weight_kg, points.first(), points.last()) {
        (Some(goal), Some(first), Some(last)) if goal > 0.0 => {
            let value = convert_from_kg(goal, unit);
            vec![
                ChartPoint {
                    date: first.date,
                    value,
                    note: None,
                },
                ChartPoint {
                    date: last.date,
                    value,
                    note: None,
                },
            ]
        }
        _ => Vec::new(),
    };

    let trend = trend_series(&sorted)
        .into_iter()
        .filter_map(|p| {
            p.weight_kg.map(|kg| ChartPoint {
                date: p.date,
                value: convert_from_kg(kg, unit),
                note: None,
            })
        })
        .collect();

    ChartSeries {
        unit,
        points,
        goal_line,
        trend,
    }
}
