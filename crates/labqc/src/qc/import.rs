//! CSV loaders for lot sheets and archived QC runs.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use super::domain::{
    parse_decimal, AnalyteCode, ControlKey, ControlLevel, EquipmentId, LotNumber, QcSubmission,
    SeriesKey, StatisticalBaseline,
};
use super::repository::{LotParameterStore, RepositoryError};

#[derive(Debug)]
pub enum ImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: usize, reason: String },
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io(err) => write!(f, "failed to read QC data: {}", err),
            ImportError::Csv(err) => write!(f, "invalid QC CSV data: {}", err),
            ImportError::InvalidRow { line, reason } => {
                write!(f, "invalid row on line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Io(err) => Some(err),
            ImportError::Csv(err) => Some(err),
            ImportError::InvalidRow { .. } => None,
        }
    }
}

impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// In-memory lot parameter store keyed by series.
#[derive(Debug, Clone, Default)]
pub struct LotParameterTable {
    baselines: HashMap<SeriesKey, StatisticalBaseline>,
}

impl LotParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later rows for the same series replace earlier ones.
    pub fn insert(&mut self, series: SeriesKey, baseline: StatisticalBaseline) {
        self.baselines.insert(series, baseline);
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Reads `equipment,lot,level,analyte,mean,sd,unit` rows.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ImportError> {
        let mut table = Self::new();

        for (index, row) in csv_reader(reader).deserialize::<LotRow>().enumerate() {
            let line = index + 2;
            let row = row?;
            let control = control_key(&row.equipment, &row.lot, &row.level, line)?;
            let analyte = analyte_code(&row.analyte, line)?;
            let mean = parse_number(&row.mean, "mean", line)?;
            let standard_deviation = parse_number(&row.sd, "sd", line)?;
            if standard_deviation < 0.0 {
                return Err(ImportError::InvalidRow {
                    line,
                    reason: format!("sd must not be negative (got {standard_deviation})"),
                });
            }

            table.insert(
                control.series(analyte),
                StatisticalBaseline {
                    mean,
                    standard_deviation,
                    unit: row.unit,
                },
            );
        }

        Ok(table)
    }
}

impl LotParameterStore for LotParameterTable {
    fn baseline(&self, series: &SeriesKey) -> Result<Option<StatisticalBaseline>, RepositoryError> {
        Ok(self.baselines.get(series).cloned())
    }
}

/// Reads archived runs in long format (`measured_at,equipment,lot,level,analyte,value`)
/// and groups them into one submission per run, oldest first.
///
/// Values are kept as text so the usual filtering applies when the runs are replayed.
pub fn read_runs<R: Read>(reader: R) -> Result<Vec<QcSubmission>, ImportError> {
    let mut runs: BTreeMap<(DateTime<Utc>, ControlKey), Map<String, Value>> = BTreeMap::new();

    for (index, row) in csv_reader(reader).deserialize::<RunRow>().enumerate() {
        let line = index + 2;
        let row = row?;
        let measured_at =
            parse_timestamp(&row.measured_at).ok_or_else(|| ImportError::InvalidRow {
                line,
                reason: format!("unrecognised timestamp '{}'", row.measured_at),
            })?;
        let control = control_key(&row.equipment, &row.lot, &row.level, line)?;
        let analyte = analyte_code(&row.analyte, line)?;
        let value = row.value.map(Value::String).unwrap_or(Value::Null);

        let run = runs.entry((measured_at, control)).or_default();
        if run.contains_key(analyte.as_str()) {
            return Err(ImportError::InvalidRow {
                line,
                reason: format!("analyte {analyte} appears twice in the run at {measured_at}"),
            });
        }
        run.insert(analyte.to_string(), value);
    }

    Ok(runs
        .into_iter()
        .map(|((measured_at, control), values)| QcSubmission {
            equipment: control.equipment,
            lot: control.lot,
            level: control.level,
            operator: None,
            measured_at: Some(measured_at),
            values,
        })
        .collect())
}

pub fn read_runs_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<QcSubmission>, ImportError> {
    let file = std::fs::File::open(path)?;
    read_runs(file)
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}

#[derive(Debug, Deserialize)]
struct LotRow {
    equipment: String,
    lot: String,
    level: String,
    analyte: String,
    mean: String,
    sd: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunRow {
    measured_at: String,
    equipment: String,
    lot: String,
    level: String,
    analyte: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    value: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn control_key(
    equipment: &str,
    lot: &str,
    level: &str,
    line: usize,
) -> Result<ControlKey, ImportError> {
    let invalid = |reason: String| ImportError::InvalidRow { line, reason };

    if equipment.is_empty() {
        return Err(invalid("equipment is empty".to_string()));
    }
    if lot.is_empty() {
        return Err(invalid("lot is empty".to_string()));
    }
    let level =
        ControlLevel::parse(level).ok_or_else(|| invalid(format!("unknown level '{level}'")))?;

    Ok(ControlKey {
        equipment: EquipmentId(equipment.to_string()),
        lot: LotNumber(lot.to_string()),
        level,
    })
}

fn analyte_code(raw: &str, line: usize) -> Result<AnalyteCode, ImportError> {
    let code = AnalyteCode::new(raw);
    if code.as_str().is_empty() {
        return Err(ImportError::InvalidRow {
            line,
            reason: "analyte is empty".to_string(),
        });
    }
    Ok(code)
}

fn parse_number(raw: &str, field: &str, line: usize) -> Result<f64, ImportError> {
    parse_decimal(raw).ok_or_else(|| ImportError::InvalidRow {
            line,
            reason: format!("{field} '{raw}' is not a number"),
        })
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M") {
        return Some(dt.and_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
