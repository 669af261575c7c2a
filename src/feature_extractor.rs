//! Feature extraction shared by training and inference.
//!
//! The extractor is fit once on the training partition and serialized into the
//! model artifact, so the scoring path applies exactly the statistics the
//! classifier was trained with.

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::types::transaction::{component_names, Transaction, PCA_COMPONENTS};
use chrono::{DateTime, Datelike, Timelike, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Number of features produced per transaction.
pub const FEATURE_COUNT: usize = PCA_COMPONENTS + 4;

/// Median / interquartile-range scaler for a single column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    pub median: f64,
    pub iqr: f64,
}

impl RobustScaler {
    /// Fit on a column of values. A zero IQR scales by 1.
    pub fn fit(values: &[f64]) -> Result<Self> {
        if values.is_empty() {
            return Err(PipelineError::Fit(
                "cannot fit a scaler on an empty column".to_string(),
            ));
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let median = quantile(&sorted, 0.5);
        let iqr = quantile(&sorted, 0.75) - quantile(&sorted, 0.25);

        Ok(Self {
            median,
            iqr: if iqr > 0.0 { iqr } else { 1.0 },
        })
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.median) / self.iqr
    }
}

/// Linear-interpolated quantile of pre-sorted values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Hour of day and day of week (Monday = 0) of a time offset in seconds.
///
/// The offset is read as seconds since the Unix epoch, so offset 0 is
/// 1970-01-01, a Thursday, and yields day 3.
pub fn time_features(seconds: f64) -> Result<(f64, f64)> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(PipelineError::Data(format!(
            "time offset {} is not a non-negative number",
            seconds
        )));
    }

    let timestamp = DateTime::<Utc>::from_timestamp(seconds.floor() as i64, 0).ok_or_else(|| {
        PipelineError::Data(format!("time offset {} is out of range", seconds))
    })?;

    Ok((
        timestamp.hour() as f64,
        timestamp.weekday().num_days_from_monday() as f64,
    ))
}

/// Transforms transactions into model input features.
///
/// Output order: `V1..V28, scaled_amount, scaled_time, hour, day`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureExtractor {
    amount_scaler: RobustScaler,
    time_scaler: RobustScaler,
}

impl FeatureExtractor {
    /// Fit the amount and time scalers on training records only.
    pub fn fit(train: &[Transaction]) -> Result<Self> {
        let amounts: Vec<f64> = train.iter().map(|tx| tx.amount).collect();
        let times: Vec<f64> = train.iter().map(|tx| tx.time).collect();

        Ok(Self {
            amount_scaler: RobustScaler::fit(&amounts)?,
            time_scaler: RobustScaler::fit(&times)?,
        })
    }

    /// Build an extractor from already fitted scalers
    pub fn from_scalers(amount_scaler: RobustScaler, time_scaler: RobustScaler) -> Self {
        Self {
            amount_scaler,
            time_scaler,
        }
    }

    pub fn amount_scaler(&self) -> &RobustScaler {
        &self.amount_scaler
    }

    pub fn time_scaler(&self) -> &RobustScaler {
        &self.time_scaler
    }

    /// Extract the feature vector of one transaction.
    pub fn extract(&self, tx: &Transaction) -> Result<Array1<f64>> {
        let mut features = Vec::with_capacity(FEATURE_COUNT);

        features.extend_from_slice(&tx.v);
        features.push(self.amount_scaler.transform(tx.amount));
        features.push(self.time_scaler.transform(tx.time));

        let (hour, day) = time_features(tx.time)?;
        features.push(hour);
        features.push(day);

        Ok(Array1::from(features))
    }

    /// Transform labelled records into a dataset.
    pub fn transform(&self, records: &[Transaction]) -> Result<Dataset> {
        let mut features = Array2::zeros((records.len(), FEATURE_COUNT));
        let mut labels = Array1::zeros(records.len());

        for (i, tx) in records.iter().enumerate() {
            features.row_mut(i).assign(&self.extract(tx)?);
            labels[i] = tx.class.ok_or_else(|| {
                PipelineError::Data(format!("record {} has no label", i))
            })?;
        }

        Dataset::new(features, labels, self.feature_names())
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in output order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = component_names();
        names.push("scaled_amount".to_string());
        names.push("scaled_time".to_string());
        names.push("hour".to_string());
        names.push("day".to_string());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn tx(time: f64, amount: f64) -> Transaction {
        Transaction::new(time, [0.5; PCA_COMPONENTS], amount).with_class(0)
    }

    #[test]
    fn test_robust_scaler_median_and_iqr() {
        let scaler = RobustScaler::fit(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_abs_diff_eq!(scaler.median, 3.0);
        // q25 = 2.0, q75 = 4.0
        assert_abs_diff_eq!(scaler.iqr, 2.0);
        assert_abs_diff_eq!(scaler.transform(5.0), 1.0);
    }

    #[test]
    fn test_robust_scaler_interpolates() {
        let scaler = RobustScaler::fit(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_abs_diff_eq!(scaler.median, 2.5);
        // q25 = 1.75, q75 = 3.25
        assert_abs_diff_eq!(scaler.iqr, 1.5);
    }

    #[test]
    fn test_robust_scaler_constant_column() {
        let scaler = RobustScaler::fit(&[7.0, 7.0, 7.0]).unwrap();
        assert_eq!(scaler.iqr, 1.0);
        assert_eq!(scaler.transform(8.0), 1.0);
    }

    #[test]
    fn test_time_features_ranges() {
        for step in 0..2000 {
            let seconds = step as f64 * 977.3;
            let (hour, day) = time_features(seconds).unwrap();
            assert!((0.0..24.0).contains(&hour));
            assert!((0.0..7.0).contains(&day));
        }
    }

    #[test]
    fn test_time_features_values() {
        // 1970-01-01 was a Thursday
        assert_eq!(time_features(0.0).unwrap(), (0.0, 3.0));
        assert_eq!(time_features(3600.0 * 25.5).unwrap(), (1.0, 4.0));
        assert!(time_features(-1.0).is_err());
    }

    #[test]
    fn test_feature_extraction() {
        let train = vec![tx(0.0, 10.0), tx(100.0, 20.0), tx(200.0, 30.0)];
        let extractor = FeatureExtractor::fit(&train).unwrap();

        let features = extractor.extract(&tx(7200.0, 20.0)).unwrap();

        assert_eq!(features.len(), extractor.feature_count());
        assert_eq!(features[0], 0.5);
        assert_abs_diff_eq!(features[28], 0.0); // amount at the median
        assert_eq!(features[30], 2.0); // hour
        assert_eq!(features[31], 3.0); // day
    }

    #[test]
    fn test_transform_builds_dataset() {
        let train = vec![tx(0.0, 10.0), tx(100.0, 20.0).with_class(1)];
        let extractor = FeatureExtractor::fit(&train).unwrap();
        let dataset = extractor.transform(&train).unwrap();

        assert_eq!(dataset.n_samples(), 2);
        assert_eq!(dataset.n_features(), FEATURE_COUNT);
        assert_eq!(dataset.class_counts(), (1, 1));
        assert_eq!(dataset.feature_names[28], "scaled_amount");
    }

    #[test]
    fn test_feature_count() {
        let extractor = FeatureExtractor::fit(&[tx(0.0, 1.0)]).unwrap();
        assert_eq!(extractor.feature_count(), 32);
        assert_eq!(extractor.feature_names().len(), 32);
    }
}
