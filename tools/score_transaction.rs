//! Transaction Scorer
//!
//! Loads a trained model artifact once and scores transactions read from
//! stdin, one JSON object of feature values per line:
//!
//! ```text
//! {"Time": 406.0, "V1": -2.31, ..., "V28": -0.14, "Amount": 0.0}
//! ```
//!
//! Each line produces one JSON result on stdout. Malformed lines and schema
//! mismatches are logged and skipped.

use anyhow::{Context, Result};
use card_fraud_classifier::{InferenceEngine, PipelineError};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct ScoredLine {
    line: usize,
    probability: f64,
    is_fraud: bool,
    threshold: f64,
    precision_at_threshold: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("score_transaction=info".parse()?)
                .add_directive("card_fraud_classifier=info".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    let artifact_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "models/fraud_model.bin".to_string());

    let engine = InferenceEngine::load(&artifact_path)
        .with_context(|| format!("Failed to load model artifact {}", artifact_path))?;
    info!(
        model = engine.model_name(),
        threshold = engine.threshold(),
        "Scoring transactions from stdin"
    );

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let (mut scored, mut rejected) = (0u64, 0u64);

    for (idx, line) in stdin.lock().lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        let features: HashMap<String, f64> = match serde_json::from_str(&line) {
            Ok(features) => features,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed JSON");
                rejected += 1;
                continue;
            }
        };

        match engine.score(&features) {
            Ok(result) => {
                let scored_line = ScoredLine {
                    line: line_no,
                    probability: result.probability,
                    is_fraud: result.is_fraud,
                    threshold: result.threshold,
                    precision_at_threshold: result.precision_at_threshold,
                };
                serde_json::to_writer(&mut out, &scored_line)?;
                writeln!(out)?;
                scored += 1;
            }
            Err(e @ PipelineError::Schema(_)) => {
                warn!(line = line_no, error = %e, "Feature schema mismatch");
                rejected += 1;
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "Scoring failed");
                rejected += 1;
            }
        }
    }

    out.flush()?;
    info!(scored = scored, rejected = rejected, "Done");
    Ok(())
}
