use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of an analyser or other piece of laboratory equipment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EquipmentId(pub String);

/// Manufacturer lot number of a control material.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LotNumber(pub String);

/// Analyte code as used on lot sheets (`GLU`, `UREA`, `K`). Codes are trimmed and
/// upper-cased so lookups do not depend on how an operator typed them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AnalyteCode(String);

impl AnalyteCode {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AnalyteCode {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<AnalyteCode> for String {
    fn from(value: AnalyteCode) -> Self {
        value.0
    }
}

impl fmt::Display for AnalyteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Target concentration band of a control lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ControlLevel {
    Low,
    Normal,
    High,
}

impl ControlLevel {
    pub fn number(self) -> u8 {
        match self {
            ControlLevel::Low => 1,
            ControlLevel::Normal => 2,
            ControlLevel::High => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ControlLevel::Low => "Level 1",
            ControlLevel::Normal => "Level 2",
            ControlLevel::High => "Level 3",
        }
    }

    /// Accepts `1`, `N1`, `Level 1`, `L1`, `low`, `normal`, `high` and similar spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "low" => return Some(ControlLevel::Low),
            "normal" => return Some(ControlLevel::Normal),
            "high" | "pathological" => return Some(ControlLevel::High),
            _ => {}
        }

        let digits: String = normalized.chars().filter(char::is_ascii_digit).collect();
        match digits.as_str() {
            "1" => Some(ControlLevel::Low),
            "2" => Some(ControlLevel::Normal),
            "3" => Some(ControlLevel::High),
            _ => None,
        }
    }
}

impl TryFrom<String> for ControlLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ControlLevel::parse(&value).ok_or_else(|| format!("unknown control level '{value}'"))
    }
}

impl From<ControlLevel> for String {
    fn from(value: ControlLevel) -> Self {
        value.number().to_string()
    }
}

impl fmt::Display for ControlLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Equipment, lot and level: the scope of one QC run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ControlKey {
    pub equipment: EquipmentId,
    pub lot: LotNumber,
    pub level: ControlLevel,
}

impl ControlKey {
    pub fn series(&self, analyte: AnalyteCode) -> SeriesKey {
        SeriesKey {
            control: self.clone(),
            analyte,
        }
    }
}

/// A single analyte tracked under a control key; history and baselines are scoped to it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    #[serde(flatten)]
    pub control: ControlKey,
    pub analyte: AnalyteCode,
}

/// Expected value and dispersion configured for a lot/level/analyte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalBaseline {
    pub mean: f64,
    pub standard_deviation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl StatisticalBaseline {
    pub fn new(mean: f64, standard_deviation: f64) -> Self {
        Self {
            mean,
            standard_deviation,
            unit: None,
        }
    }

    /// A baseline can drive rule evaluation only with a finite mean and a finite,
    /// strictly positive standard deviation.
    pub fn is_usable(&self) -> bool {
        self.mean.is_finite()
            && self.standard_deviation.is_finite()
            && self.standard_deviation > 0.0
    }
}

/// Severity of a QC evaluation. Ordering follows severity: `Ok < Warning < Error`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementStatus {
    #[default]
    Ok,
    Warning,
    Error,
}

impl MeasurementStatus {
    pub fn label(self) -> &'static str {
        match self {
            MeasurementStatus::Ok => "ok",
            MeasurementStatus::Warning => "warning",
            MeasurementStatus::Error => "error",
        }
    }

    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Raw QC run as submitted by an operator. `values` keeps the submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcSubmission {
    pub equipment: EquipmentId,
    pub lot: LotNumber,
    pub level: ControlLevel,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub measured_at: Option<DateTime<Utc>>,
    pub values: Map<String, Value>,
}

impl QcSubmission {
    pub fn control_key(&self) -> ControlKey {
        ControlKey {
            equipment: self.equipment.clone(),
            lot: self.lot.clone(),
            level: self.level,
        }
    }
}

/// Interpret a submitted value. `null`, blank strings, non-numeric strings and
/// non-finite numbers are rejected rather than coerced to zero.
pub fn parse_measurement(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|value| value.is_finite()),
        Value::String(text) => parse_decimal(text),
        _ => None,
    }
}

/// Parse a finite decimal written with either `.` or `,` as the decimal separator.
/// Grouping separators are not supported: `1,234` reads as 1.234, and text mixing both
/// separators or holding several commas is rejected.
pub(crate) fn parse_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.matches(',').count() {
        0 => {}
        1 if !trimmed.contains('.') => {}
        _ => return None,
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
