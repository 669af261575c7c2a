//! End-to-end training run: load, split, scale, resample, fit, evaluate,
//! pick a threshold and persist the chosen classifier.

use crate::config::AppConfig;
use crate::dataset::{load_transactions, stratified_split, Dataset};
use crate::error::{PipelineError, Result};
use crate::feature_extractor::FeatureExtractor;
use crate::metrics::{precision_recall_curve, ModelEvaluation};
use crate::models::{
    Classifier, GradientBoosting, IsolationForest, LogisticRegression, ModelArtifact,
    RandomForest, TrainedClassifier,
};
use crate::resampling::Smote;
use crate::threshold::{select_threshold, ThresholdSelection};
use crate::types::Transaction;
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Cutoff used for the per-model confusion matrices
const EVALUATION_CUTOFF: f64 = 0.5;
const TOP_FEATURES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub negatives: usize,
    pub positives: usize,
}

impl ClassCounts {
    fn of(dataset: &Dataset) -> Self {
        let (negatives, positives) = dataset.class_counts();
        Self {
            negatives,
            positives,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Summary of one training run, written as JSON next to the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub dataset_rows: usize,
    pub train_counts: ClassCounts,
    pub resampled_counts: ClassCounts,
    pub test_counts: ClassCounts,
    /// Test-set evaluation of every fitted model, anomaly scorer last
    pub evaluations: Vec<ModelEvaluation>,
    /// Wall-clock fit time per model
    pub fit_seconds: BTreeMap<String, f64>,
    pub selected_model: String,
    pub target_recall: f64,
    pub threshold: ThresholdSelection,
    pub top_features: Vec<FeatureImportance>,
    pub artifact_path: PathBuf,
}

impl TrainingReport {
    pub fn evaluation(&self, model: &str) -> Option<&ModelEvaluation> {
        self.evaluations.iter().find(|e| e.model == model)
    }

    pub fn print_summary(&self) {
        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              CARD FRAUD CLASSIFIER - TRAINING RUN            ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Run: {:<56}║", self.run_id);
        info!(
            "║ Rows: {:>8}  train {:>7}/{:<6} resampled {:>7}/{:<6}  ║",
            self.dataset_rows,
            self.train_counts.negatives,
            self.train_counts.positives,
            self.resampled_counts.negatives,
            self.resampled_counts.positives
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        for eval in &self.evaluations {
            info!(
                "║ {:<20} ROC-AUC {:>6.4}  PR-AUC {:>6.4}  F1 {:>6.4} ║",
                eval.model, eval.roc_auc, eval.pr_auc, eval.f1
            );
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Selected: {:<20} threshold {:>8.4} (recall >= {:.2})  ║",
            self.selected_model, self.threshold.threshold, self.target_recall
        );
        info!(
            "║   precision {:>6.4}  recall {:>6.4}                            ║",
            self.threshold.precision, self.threshold.recall
        );
        if !self.top_features.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Top features:                                                ║");
            for f in &self.top_features {
                let bar: String = "█".repeat(((f.importance * 40.0) as usize).min(30));
                info!("║   {:<14} {:>6.4} {}", f.feature, f.importance, bar);
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

/// Linear training run driven by an `AppConfig`
pub struct TrainingPipeline {
    config: AppConfig,
}

impl TrainingPipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Load the configured CSV and train on it
    pub fn run(&self) -> Result<TrainingReport> {
        self.config.validate()?;
        let records = load_transactions(&self.config.data.path)?;
        self.run_on_records(&records)
    }

    /// Train on records already in memory
    pub fn run_on_records(&self, records: &[Transaction]) -> Result<TrainingReport> {
        self.config.validate()?;
        let run_id = Uuid::new_v4();
        let cfg = &self.config;
        info!(run_id = %run_id, rows = records.len(), "Training run started");

        let split = stratified_split(records, cfg.data.test_size, cfg.data.seed)?;
        info!(train = split.train.len(), test = split.test.len(), "Stratified split done");

        // scalers see the training partition only
        let extractor = FeatureExtractor::fit(&split.train)?;
        let train = extractor.transform(&split.train)?;
        let test = extractor.transform(&split.test)?;
        info!(
            features = extractor.feature_count(),
            amount_median = extractor.amount_scaler().median,
            time_median = extractor.time_scaler().median,
            "Features extracted"
        );

        let smote = Smote::new(
            cfg.resampling.target_ratio,
            cfg.resampling.k_neighbors,
            cfg.data.seed,
        );
        let resampled = smote.fit_resample(&train)?;

        let mut fit_seconds = BTreeMap::new();
        let candidates = self.fit_classifiers(&resampled, &mut fit_seconds)?;

        let mut evaluations = Vec::with_capacity(candidates.len() + 1);
        let mut test_scores = Vec::with_capacity(candidates.len());
        for model in &candidates {
            let proba = model.predict_proba(&test);
            let eval =
                ModelEvaluation::evaluate(model.name(), &test.labels, &proba, EVALUATION_CUTOFF)?;
            eval.print_summary();
            evaluations.push(eval);
            test_scores.push(proba);
        }

        // anomaly scorer fits on the untouched training features
        let started = Instant::now();
        let isolation = IsolationForest::fit(&train, cfg.models.isolation_forest.clone())?;
        record_fit(&mut fit_seconds, isolation.name(), started);
        let anomaly_scores = isolation.score(&test);
        let eval = ModelEvaluation::evaluate(
            isolation.name(),
            &test.labels,
            &anomaly_scores,
            isolation.threshold(),
        )?;
        eval.print_summary();
        evaluations.push(eval);

        let best = self.choose_model(&evaluations[..candidates.len()])?;
        let classifier = candidates[best].clone();
        let best_scores: &Array1<f64> = &test_scores[best];
        info!(
            model = classifier.name(),
            pr_auc = evaluations[best].pr_auc,
            "Model selected"
        );

        let curve = precision_recall_curve(&test.labels, best_scores)?;
        let threshold = select_threshold(&curve, cfg.threshold.target_recall)?;
        info!(
            threshold = threshold.threshold,
            precision = threshold.precision,
            recall = threshold.recall,
            target_recall = cfg.threshold.target_recall,
            "Operating threshold chosen"
        );

        let top_features = top_features(&classifier, &extractor.feature_names());

        let artifact = ModelArtifact::new(run_id, extractor, classifier, threshold);
        artifact.save(&cfg.output.model_path)?;

        let report = TrainingReport {
            run_id,
            trained_at: artifact.trained_at,
            dataset_rows: records.len(),
            train_counts: ClassCounts::of(&train),
            resampled_counts: ClassCounts::of(&resampled),
            test_counts: ClassCounts::of(&test),
            evaluations,
            fit_seconds,
            selected_model: artifact.model_name.clone(),
            target_recall: cfg.threshold.target_recall,
            threshold,
            top_features,
            artifact_path: cfg.output.model_path.clone(),
        };
        self.write_report(&report)?;

        Ok(report)
    }

    fn fit_classifiers(
        &self,
        resampled: &Dataset,
        fit_seconds: &mut BTreeMap<String, f64>,
    ) -> Result<Vec<TrainedClassifier>> {
        let params = &self.config.models;
        let mut models: Vec<TrainedClassifier> = Vec::with_capacity(3);

        let started = Instant::now();
        let forest = RandomForest::fit(resampled, params.random_forest.clone())?;
        record_fit(fit_seconds, forest.name(), started);
        models.push(forest.into());

        let started = Instant::now();
        let boosting = GradientBoosting::fit(resampled, params.gradient_boosting.clone())?;
        record_fit(fit_seconds, boosting.name(), started);
        models.push(boosting.into());

        let started = Instant::now();
        let logistic = LogisticRegression::fit(resampled, params.logistic_regression.clone())?;
        record_fit(fit_seconds, logistic.name(), started);
        models.push(logistic.into());

        Ok(models)
    }

    /// Index of the deployed model among the supervised evaluations
    fn choose_model(&self, evaluations: &[ModelEvaluation]) -> Result<usize> {
        match self.config.models.selection.model_name() {
            Some(name) => evaluations
                .iter()
                .position(|e| e.model == name)
                .ok_or_else(|| PipelineError::Config(format!("unknown model {}", name))),
            None => evaluations
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.pr_auc.total_cmp(&b.pr_auc))
                .map(|(i, _)| i)
                .ok_or_else(|| PipelineError::Fit("no classifier was fitted".to_string())),
        }
    }

    fn write_report(&self, report: &TrainingReport) -> Result<()> {
        let path = &self.config.output.report_path;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, report)?;
        info!(path = %path.display(), "Training report written");
        Ok(())
    }
}

fn record_fit(fit_seconds: &mut BTreeMap<String, f64>, model: &str, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    info!(model = model, seconds = format!("{:.2}", elapsed), "Model fitted");
    fit_seconds.insert(model.to_string(), elapsed);
}

fn top_features(classifier: &TrainedClassifier, names: &[String]) -> Vec<FeatureImportance> {
    let Some(importances) = classifier.feature_importances() else {
        return Vec::new();
    };
    if importances.len() != names.len() {
        warn!(
            importances = importances.len(),
            names = names.len(),
            "Feature importance length mismatch, skipping"
        );
        return Vec::new();
    }

    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .zip(importances)
        .map(|(name, &importance)| FeatureImportance {
            feature: name.clone(),
            importance,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked.truncate(TOP_FEATURES);
    ranked
}
