use serde::{Deserialize, Serialize};

/// Descriptive statistics over accepted QC values, used for display and reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveStatistics {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (Bessel's correction).
    pub standard_deviation: f64,
    /// Standard deviation as a percentage of the mean; zero when the mean is zero.
    pub coefficient_of_variation: f64,
}

impl DescriptiveStatistics {
    pub fn from_values(values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self::default();
        }

        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let squared_deviations: f64 = values.iter().map(|value| (value - mean).powi(2)).sum();
        let divisor = if count > 1 { n - 1.0 } else { 1.0 };
        let standard_deviation = (squared_deviations / divisor).sqrt();
        let coefficient_of_variation = if mean == 0.0 {
            0.0
        } else {
            standard_deviation / mean * 100.0
        };

        Self {
            count,
            mean,
            standard_deviation,
            coefficient_of_variation,
        }
    }
}
