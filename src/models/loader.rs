//! Model artifact persistence

use super::{Classifier, TrainedClassifier};
use crate::error::{PipelineError, Result};
use crate::feature_extractor::FeatureExtractor;
use crate::threshold::ThresholdSelection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Bumped whenever the serialized layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 2;

/// Everything inference needs, written once per training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub model_name: String,
    /// Column order the classifier was trained on
    pub feature_names: Vec<String>,
    /// Scalers fit on the training split
    pub extractor: FeatureExtractor,
    pub classifier: TrainedClassifier,
    /// Cutoff chosen at the target recall, with the test-split precision
    /// and recall it achieved
    pub operating_point: ThresholdSelection,
}

impl ModelArtifact {
    pub fn new(
        run_id: Uuid,
        extractor: FeatureExtractor,
        classifier: TrainedClassifier,
        operating_point: ThresholdSelection,
    ) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            run_id,
            trained_at: Utc::now(),
            model_name: classifier.name().to_string(),
            feature_names: extractor.feature_names(),
            extractor,
            classifier,
            operating_point,
        }
    }

    /// Probability cutoff for the fraud decision
    pub fn threshold(&self) -> f64 {
        self.operating_point.threshold
    }

    /// Write the artifact, creating parent directories as needed
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;

        info!(
            model = %self.model_name,
            run_id = %self.run_id,
            path = %path.display(),
            "Model artifact saved"
        );
        Ok(())
    }

    /// Read an artifact and check it matches this build
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PipelineError::Artifact(format!("cannot open {}: {}", path.display(), e))
        })?;
        let artifact: Self = bincode::deserialize_from(BufReader::new(file))?;

        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(PipelineError::Artifact(format!(
                "unsupported format version {} (expected {})",
                artifact.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        let expected = artifact.extractor.feature_count();
        if artifact.feature_names.len() != expected {
            return Err(PipelineError::Artifact(format!(
                "artifact lists {} features, extractor produces {}",
                artifact.feature_names.len(),
                expected
            )));
        }

        info!(
            model = %artifact.model_name,
            run_id = %artifact.run_id,
            trained_at = %artifact.trained_at,
            threshold = artifact.operating_point.threshold,
            precision = artifact.operating_point.precision,
            "Model artifact loaded"
        );
        Ok(artifact)
    }
}
