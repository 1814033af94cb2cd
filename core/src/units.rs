use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

pub const LBS_PER_KG: f64 = 2.20462;

/// Shown wherever a value is absent or not a number.
pub const PLACEHOLDER: &str = "--";

/// Display unit for weights. Storage is always kilograms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Kg,
    Lbs,
}

impl WeightUnit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kg => "kg",
            Self::Lbs => "lbs",
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeightUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kg" | "kgs" => Ok(Self::Kg),
            "lbs" | "lb" => Ok(Self::Lbs),
            _ => bail!("Invalid unit '{s}'. Use 'kg' or 'lbs'"),
        }
    }
}

#[must_use]
pub fn convert_to_kg(value: f64, unit: WeightUnit) -> f64 {
    match unit {
        WeightUnit::Kg => value,
        WeightUnit::Lbs => value / LBS_PER_KG,
    }
}

#[must_use]
pub fn convert_from_kg(value: f64, unit: WeightUnit) -> f64 {
    match unit {
        WeightUnit::Kg => value,
        WeightUnit::Lbs => value * LBS_PER_KG,
    }
}

/// Format a kilogram value in the display unit with one decimal, e.g. `"72.3 kg"`.
///
/// Absent and non-finite values render as [`PLACEHOLDER`].
#[must_use]
pub fn format_weight(value: Option<f64>, unit: WeightUnit) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(kg) => {
            let shown = no_neg_zero(round1(convert_from_kg(kg, unit)));
            format!("{shown:.1} {unit}")
        }
        None => PLACEHOLDER.to_string(),
    }
}

/// Height is entered in centimetres and stored in metres.
#[must_use]
pub fn height_cm_to_m(cm: f64) -> f64 {
    cm / 100.0
}

/// Round to one decimal place, half away from zero.
#[must_use]
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[must_use]
pub fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}
