//! CSV loading, the in-memory feature matrix and the stratified train/test split

use crate::error::{PipelineError, Result};
use crate::types::transaction::{
    component_names, Transaction, AMOUNT_COLUMN, CLASS_COLUMN, PCA_COMPONENTS, TIME_COLUMN,
};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Load labelled transactions from a CSV file with a header row.
pub fn load_transactions<P: AsRef<Path>>(path: P) -> Result<Vec<Transaction>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        PipelineError::Data(format!("cannot open dataset {}: {}", path.display(), e))
    })?;

    let records = read_transactions(file, &path.display().to_string())?;
    info!(
        path = %path.display(),
        rows = records.len(),
        "Dataset loaded"
    );
    Ok(records)
}

/// Read labelled transactions from any CSV source.
///
/// Columns are located by header name; their order is free and extra columns
/// are ignored.
pub fn read_transactions<R: Read>(source: R, source_name: &str) -> Result<Vec<Transaction>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    let column = |name: &str| -> Result<usize> {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            PipelineError::Data(format!("column {} missing from {}", name, source_name))
        })
    };

    let time_idx = column(TIME_COLUMN)?;
    let amount_idx = column(AMOUNT_COLUMN)?;
    let class_idx = column(CLASS_COLUMN)?;
    let component_idx = component_names()
        .iter()
        .map(|name| column(name))
        .collect::<Result<Vec<usize>>>()?;

    let mut records = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        // header is line 1
        let line = row + 2;

        let number = |idx: usize| -> Result<f64> {
            let raw = record.get(idx).unwrap_or("");
            let value: f64 = raw.parse().map_err(|_| {
                PipelineError::Data(format!(
                    "{}:{}: column {} has non-numeric value {:?}",
                    source_name, line, &headers[idx], raw
                ))
            })?;
            if !value.is_finite() {
                return Err(PipelineError::Data(format!(
                    "{}:{}: column {} is not finite",
                    source_name, line, &headers[idx]
                )));
            }
            Ok(value)
        };

        let mut v = [0.0; PCA_COMPONENTS];
        for (slot, &idx) in v.iter_mut().zip(&component_idx) {
            *slot = number(idx)?;
        }

        let class = match number(class_idx)? {
            c if c == 0.0 => 0,
            c if c == 1.0 => 1,
            other => {
                return Err(PipelineError::Data(format!(
                    "{}:{}: label must be 0 or 1, got {}",
                    source_name, line, other
                )))
            }
        };

        records.push(Transaction::new(number(time_idx)?, v, number(amount_idx)?).with_class(class));
    }

    if records.is_empty() {
        return Err(PipelineError::Data(format!(
            "{} contains no transactions",
            source_name
        )));
    }

    Ok(records)
}

/// Train/test partition of labelled records
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Vec<Transaction>,
    pub test: Vec<Transaction>,
}

/// Split records into train and test partitions preserving the class ratio.
///
/// Each class is shuffled independently with a seeded generator and
/// `round(n_class * test_size)` of its rows go to the test partition. Both
/// partitions keep the source order.
pub fn stratified_split(records: &[Transaction], test_size: f64, seed: u64) -> Result<Split> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::Config(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, record) in records.iter().enumerate() {
        match record.class {
            Some(class @ (0 | 1)) => by_class[class as usize].push(i),
            _ => {
                return Err(PipelineError::Data(format!(
                    "record {} has no usable label",
                    i
                )))
            }
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut in_test = vec![false; records.len()];

    for (class, indices) in by_class.iter_mut().enumerate() {
        if indices.is_empty() {
            return Err(PipelineError::Fit(format!(
                "class {} is absent from the dataset",
                class
            )));
        }

        let n_test = (indices.len() as f64 * test_size).round() as usize;
        if n_test == 0 || n_test == indices.len() {
            return Err(PipelineError::Fit(format!(
                "class {} has {} rows, too few to appear in both partitions",
                class,
                indices.len()
            )));
        }

        indices.shuffle(&mut rng);
        for &i in &indices[..n_test] {
            in_test[i] = true;
        }
    }

    let mut split = Split {
        train: Vec::with_capacity(records.len()),
        test: Vec::new(),
    };
    for (record, &is_test) in records.iter().zip(&in_test) {
        if is_test {
            split.test.push(record.clone());
        } else {
            split.train.push(record.clone());
        }
    }

    debug!(
        train = split.train.len(),
        test = split.test.len(),
        "Stratified split complete"
    );

    Ok(split)
}

/// Feature matrix with binary labels
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Feature matrix (n_samples x n_features)
    pub features: Array2<f64>,
    /// Labels (1 = fraud)
    pub labels: Array1<u8>,
    /// Feature names in column order
    pub feature_names: Vec<String>,
}

impl Dataset {
    /// Create a dataset, checking that the shapes agree
    pub fn new(
        features: Array2<f64>,
        labels: Array1<u8>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(PipelineError::Data(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        if features.ncols() != feature_names.len() {
            return Err(PipelineError::Data(format!(
                "{} feature columns but {} names",
                features.ncols(),
                feature_names.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l > 1) {
            return Err(PipelineError::Data(format!("label {} is not binary", bad)));
        }

        Ok(Self {
            features,
            labels,
            feature_names,
        })
    }

    /// Number of samples
    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    /// Number of features
    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Feature row `i`
    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.features.row(i)
    }

    /// (negatives, positives)
    pub fn class_counts(&self) -> (usize, usize) {
        let positives = self.labels.iter().filter(|&&l| l == 1).count();
        (self.n_samples() - positives, positives)
    }

    /// Positive to negative count ratio
    pub fn minority_ratio(&self) -> f64 {
        let (negatives, positives) = self.class_counts();
        if negatives == 0 {
            return f64::INFINITY;
        }
        positives as f64 / negatives as f64
    }

    /// Indices of the rows labelled `class`
    pub fn indices_of_class(&self, class: u8) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect()
    }

    /// Labels as 0.0 / 1.0
    pub fn labels_f64(&self) -> Array1<f64> {
        self.labels.mapv(f64::from)
    }

    /// Copy of the rows at `indices`, in the given order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
            feature_names: self.feature_names.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_header() -> String {
        let mut columns = vec!["Time".to_string()];
        columns.extend(component_names());
        columns.push("Amount".to_string());
        columns.push("Class".to_string());
        columns.join(",")
    }

    fn csv_row(time: f64, amount: f64, class: &str) -> String {
        let mut fields = vec![time.to_string()];
        fields.extend((1..=28).map(|i| format!("{:.2}", i as f64 * 0.01)));
        fields.push(amount.to_string());
        fields.push(class.to_string());
        fields.join(",")
    }

    fn labelled(n_neg: usize, n_pos: usize) -> Vec<Transaction> {
        (0..n_neg + n_pos)
            .map(|i| {
                let class = if i < n_neg { 0 } else { 1 };
                Transaction::new(i as f64, [0.0; PCA_COMPONENTS], i as f64).with_class(class)
            })
            .collect()
    }

    #[test]
    fn test_read_transactions() {
        let csv = format!(
            "{}\n{}\n{}\n",
            csv_header(),
            csv_row(0.0, 149.62, "\"0\""),
            csv_row(406.0, 0.0, "1")
        );

        let records = read_transactions(csv.as_bytes(), "inline").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, 149.62);
        assert_eq!(records[0].class, Some(0));
        assert_eq!(records[1].time, 406.0);
        assert!(records[1].is_fraud());
        assert_eq!(records[1].v[27], 0.28);
    }

    #[test]
    fn test_missing_column_is_data_error() {
        let header = csv_header().replace(",V5,", ",V5x,");
        let csv = format!("{}\n{}\n", header, csv_row(0.0, 1.0, "0"));

        let err = read_transactions(csv.as_bytes(), "inline").unwrap_err();
        assert!(matches!(err, PipelineError::Data(ref msg) if msg.contains("V5")));
    }

    #[test]
    fn test_bad_label_is_data_error() {
        let csv = format!("{}\n{}\n", csv_header(), csv_row(0.0, 1.0, "2"));
        assert!(matches!(
            read_transactions(csv.as_bytes(), "inline"),
            Err(PipelineError::Data(_))
        ));
    }

    #[test]
    fn test_empty_dataset_is_data_error() {
        let csv = format!("{}\n", csv_header());
        assert!(matches!(
            read_transactions(csv.as_bytes(), "inline"),
            Err(PipelineError::Data(_))
        ));
    }

    #[test]
    fn test_stratified_split_preserves_ratio() {
        let records = labelled(900, 100);
        let split = stratified_split(&records, 0.2, 7).unwrap();

        assert_eq!(split.train.len() + split.test.len(), 1000);
        assert_eq!(split.test.len(), 200);
        assert_eq!(split.test.iter().filter(|r| r.is_fraud()).count(), 20);
        assert_eq!(split.train.iter().filter(|r| r.is_fraud()).count(), 80);

        // source order kept
        assert!(split.test.windows(2).all(|w| w[0].time < w[1].time));
        assert!(split.train.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn test_stratified_split_is_deterministic() {
        let records = labelled(300, 30);
        let a = stratified_split(&records, 0.25, 42).unwrap();
        let b = stratified_split(&records, 0.25, 42).unwrap();
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_split_rejects_single_class() {
        let records = labelled(50, 0);
        assert!(matches!(
            stratified_split(&records, 0.2, 1),
            Err(PipelineError::Fit(_))
        ));
    }

    #[test]
    fn test_dataset_class_counts() {
        let features = Array2::zeros((5, 2));
        let labels = Array1::from(vec![0, 1, 0, 0, 1]);
        let dataset = Dataset::new(features, labels, vec!["a".into(), "b".into()]).unwrap();

        assert_eq!(dataset.class_counts(), (3, 2));
        assert_eq!(dataset.indices_of_class(1), vec![1, 4]);
        assert!((dataset.minority_ratio() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_dataset_shape_mismatch() {
        let features = Array2::zeros((3, 2));
        let labels = Array1::from(vec![0, 1]);
        assert!(Dataset::new(features, labels, vec!["a".into(), "b".into()]).is_err());
    }
}
