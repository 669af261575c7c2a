//! Decision threshold selection on the precision-recall curve

use crate::error::{PipelineError, Result};
use crate::metrics::PrecisionRecallCurve;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_TARGET_RECALL: f64 = 0.90;

/// Operating point chosen for the deployed model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSelection {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Pick the smallest threshold whose recall reaches `target_recall`.
///
/// Thresholds are scanned in ascending order; recall only falls as the
/// threshold rises, so the first qualifying point is the lowest one.
pub fn select_threshold(
    curve: &PrecisionRecallCurve,
    target_recall: f64,
) -> Result<ThresholdSelection> {
    if !(target_recall > 0.0 && target_recall <= 1.0) {
        return Err(PipelineError::Config(format!(
            "target recall must be in (0, 1], got {}",
            target_recall
        )));
    }

    let selected = curve
        .thresholds
        .iter()
        .zip(curve.precision.iter())
        .zip(curve.recall.iter())
        .find(|(_, &recall)| recall >= target_recall)
        .map(|((&threshold, &precision), &recall)| ThresholdSelection {
            threshold,
            precision,
            recall,
        });

    match selected {
        Some(selection) => {
            debug!(
                threshold = selection.threshold,
                precision = selection.precision,
                recall = selection.recall,
                "Threshold selected"
            );
            Ok(selection)
        }
        None => Err(PipelineError::ThresholdNotFound {
            target: target_recall,
        }),
    }
}
