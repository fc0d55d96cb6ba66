use crate::infra::{load_lot_parameters, parse_measurement_arg, InMemoryQcRecords};
use clap::Args;
use labqc::config::QcConfig;
use labqc::error::AppError;
use labqc::qc::{
    evaluate_measurement, read_runs_from_path, DescriptiveStatistics, MeasurementEvaluation,
    QcRecord, QcService, StatisticalBaseline,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Measured control value
    #[arg(long, allow_hyphen_values = true, value_parser = parse_measurement_arg)]
    pub(crate) value: f64,
    /// Target mean of the control material
    #[arg(long, allow_hyphen_values = true, value_parser = parse_measurement_arg)]
    pub(crate) mean: f64,
    /// Standard deviation of the control material
    #[arg(long, value_parser = parse_measurement_arg)]
    pub(crate) sd: f64,
    /// Previously accepted values, oldest first, comma separated
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        value_parser = parse_measurement_arg
    )]
    pub(crate) history: Vec<f64>,
}

#[derive(Args, Debug)]
pub(crate) struct StatsArgs {
    /// Values to summarise, comma separated
    #[arg(
        long,
        required = true,
        value_delimiter = ',',
        allow_hyphen_values = true,
        value_parser = parse_measurement_arg
    )]
    pub(crate) values: Vec<f64>,
}

#[derive(Args, Debug)]
pub(crate) struct ReplayArgs {
    /// Lot sheet CSV (equipment,lot,level,analyte,mean,sd,unit)
    #[arg(long)]
    pub(crate) lots: PathBuf,
    /// Run export CSV (measured_at,equipment,lot,level,analyte,value)
    #[arg(long)]
    pub(crate) runs: PathBuf,
    /// Number of prior runs per control used as history
    #[arg(long)]
    pub(crate) history_window: Option<usize>,
    /// Print the stored records as JSON instead of a summary
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let baseline = StatisticalBaseline::new(args.mean, args.sd);
    let evaluation = evaluate_measurement(args.value, &args.history, Some(&baseline));
    if !baseline.is_usable() {
        println!("Baseline has no dispersion; rules were not checked");
    }
    println!("{}", format_evaluation(args.value, &evaluation));
    Ok(())
}

pub(crate) fn run_stats(args: StatsArgs) -> Result<(), AppError> {
    let statistics = DescriptiveStatistics::from_values(&args.values);
    println!("{}", format_statistics(&statistics));
    Ok(())
}

pub(crate) fn run_replay(args: ReplayArgs) -> Result<(), AppError> {
    let ReplayArgs {
        lots,
        runs,
        history_window,
        json,
    } = args;

    let lots = Arc::new(load_lot_parameters(Some(lots.as_path()))?);
    let runs = read_runs_from_path(&runs)?;
    let mut config = QcConfig::default();
    if let Some(window) = history_window.filter(|window| *window > 0) {
        config.history_window = window;
    }

    let service = QcService::new(lots, Arc::new(InMemoryQcRecords::default()), config);

    let mut records = Vec::new();
    for run in runs {
        if let Some(record) = service.submit(run)? {
            records.push(record);
        }
    }

    if json {
        match serde_json::to_string_pretty(&records) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => println!("Replay payload unavailable: {err}"),
        }
        return Ok(());
    }

    println!("Replayed {} control runs", records.len());
    for record in &records {
        println!("{}", format_record(record));
    }
    let flagged = records
        .iter()
        .filter(|record| record.evaluation.requires_review())
        .count();
    println!("{flagged} runs require review");
    Ok(())
}

fn format_rules<T: ToString>(rules: &[T]) -> String {
    if rules.is_empty() {
        "none".to_string()
    } else {
        rules
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn format_evaluation(value: f64, evaluation: &MeasurementEvaluation) -> String {
    format!(
        "{value}: {} (rules: {})",
        evaluation.status().label(),
        format_rules(evaluation.triggered_rules())
    )
}

fn format_statistics(statistics: &DescriptiveStatistics) -> String {
    format!(
        "n={} | mean {:.4} | sd {:.4} | cv {:.2}%",
        statistics.count,
        statistics.mean,
        statistics.standard_deviation,
        statistics.coefficient_of_variation
    )
}

fn format_record(record: &QcRecord) -> String {
    let mut line = format!(
        "- {} {} {}/{} {}: {} (rules: {})",
        record.id,
        record.measured_at.format("%Y-%m-%d %H:%M"),
        record.control.equipment.0,
        record.control.lot.0,
        record.control.level,
        record.evaluation.overall_status().label(),
        format_rules(record.evaluation.all_triggered_rules())
    );
    if !record.skipped.is_empty() {
        line.push_str(&format!(" | skipped {}", format_rules(&record.skipped)));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use labqc::qc::{
        AnalyteCode, AnalyteEvaluation, ControlKey, ControlLevel, EquipmentId, LotNumber,
        QcRecordId, ReportEvaluation,
    };

    #[test]
    fn evaluation_line_lists_triggered_rules() {
        let baseline = StatisticalBaseline::new(100.0, 5.0);
        let evaluation = evaluate_measurement(112.0, &[111.0], Some(&baseline));
        assert_eq!(
            format_evaluation(112.0, &evaluation),
            "112: error (rules: 1-2s, 2-2s)"
        );

        let evaluation = evaluate_measurement(100.0, &[], Some(&baseline));
        assert_eq!(format_evaluation(100.0, &evaluation), "100: ok (rules: none)");
    }

    #[test]
    fn statistics_line_uses_sample_deviation() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let statistics = DescriptiveStatistics::from_values(&values);
        assert_eq!(
            format_statistics(&statistics),
            "n=8 | mean 5.0000 | sd 2.1381 | cv 42.76%"
        );
    }

    #[test]
    fn record_line_mentions_skipped_analytes() {
        let baseline = StatisticalBaseline::new(40.0, 2.0);
        let analyte = AnalyteEvaluation::new(
            AnalyteCode::new("urea"),
            47.0,
            evaluate_measurement(47.0, &[], Some(&baseline)),
            true,
        );
        let record = QcRecord {
            id: QcRecordId("qc-000007".to_string()),
            control: ControlKey {
                equipment: EquipmentId("AU480-01".to_string()),
                lot: LotNumber("L-2291".to_string()),
                level: ControlLevel::High,
            },
            operator: None,
            measured_at: Utc
                .with_ymd_and_hms(2025, 3, 5, 7, 52, 0)
                .single()
                .expect("valid timestamp"),
            evaluation: ReportEvaluation::from_analytes(vec![analyte]),
            skipped: vec![AnalyteCode::new("CREA")],
        };

        assert_eq!(
            format_record(&record),
            "- qc-000007 2025-03-05 07:52 AU480-01/L-2291 Level 3: error (rules: 1-3s for UREA) | skipped CREA"
        );
    }
}
