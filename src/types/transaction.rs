//! Transaction record for the anonymized credit card dataset

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of anonymized PCA components (`V1`..`V28`).
pub const PCA_COMPONENTS: usize = 28;

pub const TIME_COLUMN: &str = "Time";
pub const AMOUNT_COLUMN: &str = "Amount";
pub const CLASS_COLUMN: &str = "Class";

/// Names of the PCA component columns in schema order.
pub fn component_names() -> Vec<String> {
    (1..=PCA_COMPONENTS).map(|i| format!("V{}", i)).collect()
}

/// Every feature column an unlabelled record must carry.
pub fn required_columns() -> Vec<String> {
    let mut columns = Vec::with_capacity(PCA_COMPONENTS + 2);
    columns.push(TIME_COLUMN.to_string());
    columns.extend(component_names());
    columns.push(AMOUNT_COLUMN.to_string());
    columns
}

/// A single card transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Seconds elapsed since the first transaction of the dataset
    pub time: f64,

    /// PCA-derived components V1..V28
    pub v: [f64; PCA_COMPONENTS],

    /// Transaction amount
    pub amount: f64,

    /// Fraud label (1 = fraud). Present in training data only.
    pub class: Option<u8>,
}

impl Transaction {
    /// Create an unlabelled transaction
    pub fn new(time: f64, v: [f64; PCA_COMPONENTS], amount: f64) -> Self {
        Self {
            time,
            v,
            amount,
            class: None,
        }
    }

    /// Attach a label
    pub fn with_class(mut self, class: u8) -> Self {
        self.class = Some(class);
        self
    }

    /// Whether this record is labelled as fraud
    pub fn is_fraud(&self) -> bool {
        self.class == Some(1)
    }

    /// Build an unlabelled record from named feature values.
    ///
    /// The mapping must contain exactly `Time`, `V1`..`V28` and `Amount`.
    pub fn from_feature_map(features: &HashMap<String, f64>) -> Result<Self> {
        let required = required_columns();

        let mut missing: Vec<&str> = required
            .iter()
            .filter(|name| !features.contains_key(name.as_str()))
            .map(|name| name.as_str())
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(PipelineError::Schema(format!(
                "missing feature(s): {}",
                missing.join(", ")
            )));
        }

        let mut unknown: Vec<&str> = features
            .keys()
            .filter(|key| !required.contains(key))
            .map(|key| key.as_str())
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(PipelineError::Schema(format!(
                "unexpected feature(s): {}",
                unknown.join(", ")
            )));
        }

        let value = |name: &str| -> Result<f64> {
            let value = features[name];
            if value.is_finite() {
                Ok(value)
            } else {
                Err(PipelineError::Schema(format!(
                    "feature {} is not a finite number",
                    name
                )))
            }
        };

        let mut v = [0.0; PCA_COMPONENTS];
        for (i, slot) in v.iter_mut().enumerate() {
            *slot = value(&format!("V{}", i + 1))?;
        }

        Ok(Self::new(value(TIME_COLUMN)?, v, value(AMOUNT_COLUMN)?))
    }

    /// Named feature values of this record (label excluded)
    pub fn to_feature_map(&self) -> HashMap<String, f64> {
        let mut features = HashMap::with_capacity(PCA_COMPONENTS + 2);
        features.insert(TIME_COLUMN.to_string(), self.time);
        for (i, &value) in self.v.iter().enumerate() {
            features.insert(format!("V{}", i + 1), value);
        }
        features.insert(AMOUNT_COLUMN.to_string(), self.amount);
        features
    }
}
