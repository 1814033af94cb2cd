//! Derived statistics over a user's weight history.
//!
//! Everything here is a pure function of its inputs. Values that cannot be
//! derived (no entries, no goal, no height, empty window) come back as `None`
//! rather than an error; the wall clock is always passed in as `now`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{ProfileSettings, WeightEntry};
use crate::units::{PLACEHOLDER, round1};

/// Number of entries in the trailing trend window.
pub const TREND_WINDOW: usize = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiCategory {
    #[default]
    Unknown,
    Underweight,
    Normal,
    Overweight,
    Obese,
    SeverelyObese,
}

impl BmiCategory {
    /// Bucket a BMI value. Lower bounds are inclusive.
    #[must_use]
    pub fn from_bmi(bmi: Option<f64>) -> Self {
        match bmi.filter(|b| b.is_finite()) {
            None => Self::Unknown,
            Some(b) if b < 18.5 => Self::Underweight,
            Some(b) if b < 25.0 => Self::Normal,
            Some(b) if b < 30.0 => Self::Overweight,
            Some(b) if b < 35.0 => Self::Obese,
            Some(_) => Self::SeverelyObese,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Underweight => "Underweight",
            Self::Normal => "Normal",
            Self::Overweight => "Overweight",
            Self::Obese => "Obese",
            Self::SeverelyObese => "Severely obese",
        }
    }

    /// Colour a client should use when rendering the BMI value.
    #[must_use]
    pub fn color(self) -> &'static str {
        match self {
            Self::Unknown => "slate",
            Self::Underweight => "blue",
            Self::Normal => "green",
            Self::Overweight => "yellow",
            Self::Obese => "orange",
            Self::SeverelyObese => "red",
        }
    }
}

/// View model consumed by the presentation layer. All weights in kilograms.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeightStats {
    pub current: Option<f64>,
    pub first: Option<f64>,
    pub goal: Option<f64>,
    pub change: Option<f64>,
    pub bmi: Option<f64>,
    pub bmi_category: BmiCategory,
    pub weekly_avg: Option<f64>,
    pub monthly_avg: Option<f64>,
    pub lowest: Option<f64>,
    pub highest: Option<f64>,
    pub progress: Option<f64>,
    /// Signed distance from the goal, `current - goal`.
    pub to_goal: Option<f64>,
    pub entry_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: DateTime<Utc>,
    pub weight_kg: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    GoalReached,
    NewLow,
}

/// Entries in chronological order. Entries sharing a date keep their input order.
#[must_use]
pub fn sort_entries(entries: &[WeightEntry]) -> Vec<WeightEntry> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| e.date);
    sorted
}

/// BMI rounded to one decimal, or `None` unless both inputs are positive and finite.
#[must_use]
pub fn calculate_bmi(weight_kg: Option<f64>, height_m: Option<f64>) -> Option<f64> {
    let w = weight_kg.filter(|w| w.is_finite() && *w > 0.0)?;
    let h = height_m.filter(|h| h.is_finite() && *h > 0.0)?;
    Some(round1(w / (h * h)))
}

#[must_use]
pub fn format_bmi(bmi: Option<f64>) -> String {
    bmi.filter(|b| b.is_finite())
        .map_or_else(|| PLACEHOLDER.to_string(), |b| format!("{b:.1}"))
}

/// Percentage of the way from `start` to `goal`, clamped to `[0, 100]`.
///
/// Overshooting the goal and moving away from it both clamp; callers that need
/// to tell them apart should look at `current - goal`.
#[must_use]
pub fn goal_progress(start: f64, current: f64, goal: f64) -> f64 {
    let total_distance = (start - goal).abs();
    let progress = if total_distance > 0.0 {
        (start - current) / (start - goal) * 100.0
    } else if current <= goal {
        100.0
    } else {
        0.0
    };
    progress.clamp(0.0, 100.0)
}

/// Mean of numeric weights dated within `[now - days, now]`.
#[must_use]
pub fn rolling_average(entries: &[WeightEntry], now: DateTime<Utc>, days: i64) -> Option<f64> {
    let cutoff = now - Duration::days(days);
    mean(
        entries
            .iter()
            .filter(|e| e.date >= cutoff && e.date <= now)
            .filter_map(WeightEntry::weight),
    )
}

/// Trailing moving average over the last [`TREND_WINDOW`] entries of a sorted series.
///
/// One point per index from `TREND_WINDOW - 1` onwards, dated like the entry it
/// ends on. The denominator is the number of numeric weights in the window.
#[must_use]
pub fn trend_series(sorted: &[WeightEntry]) -> Vec<TrendPoint> {
    if sorted.len() < TREND_WINDOW {
        return Vec::new();
    }
    sorted
        .windows(TREND_WINDOW)
        .map(|window| TrendPoint {
            date: window[TREND_WINDOW - 1].date,
            weight_kg: mean(window.iter().filter_map(WeightEntry::weight)),
        })
        .collect()
}

/// Derive every statistic for one user at instant `now`.
#[must_use]
pub fn compute_stats(
    entries: &[WeightEntry],
    settings: &ProfileSettings,
    now: DateTime<Utc>,
) -> WeightStats {
    let sorted = sort_entries(entries);
    let (Some(first_entry), Some(latest_entry)) = (sorted.first(), sorted.last()) else {
        return WeightStats::default();
    };

    let first = first_entry.weight();
    let current = latest_entry.weight();
    let goal = settings.goal_weight_kg.filter(|g| g.is_finite() && *g > 0.0);
    let bmi = calculate_bmi(current, settings.height_m);

    let numeric = || sorted.iter().filter_map(WeightEntry::weight);
    let lowest = numeric().reduce(f64::min);
    let highest = numeric().reduce(f64::max);

    let (progress, to_goal) = match (first, current, goal) {
        (Some(start), Some(cur), Some(g)) => (Some(goal_progress(start, cur, g)), Some(cur - g)),
        (_, Some(cur), Some(g)) => (None, Some(cur - g)),
        _ => (None, None),
    };

    WeightStats {
        current,
        first,
        goal,
        change: current.zip(first).map(|(c, f)| c - f),
        bmi,
        bmi_category: BmiCategory::from_bmi(bmi),
        weekly_avg: rolling_average(&sorted, now, 7),
        monthly_avg: rolling_average(&sorted, now, 30),
        lowest,
        highest,
        progress,
        to_goal,
        entry_count: sorted.len(),
    }
}

/// Decide whether logging `new_weight_kg` on top of `previous` is worth celebrating.
#[must_use]
pub fn detect_milestone(
    previous: &[WeightEntry],
    new_weight_kg: f64,
    goal_weight_kg: Option<f64>,
) -> Option<Milestone> {
    if goal_weight_kg.is_some_and(|g| g > 0.0 && new_weight_kg <= g) {
        return Some(Milestone::GoalReached);
    }
    let previous_lowest = previous
        .iter()
        .filter_map(WeightEntry::weight)
        .fold(f64::INFINITY, f64::min);
    (new_weight_kg < previous_lowest).then_some(Milestone::NewLow)
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}
