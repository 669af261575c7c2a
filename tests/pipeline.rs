use card_fraud_classifier::models::{BoostingParams, ForestParams, IsolationParams};
use card_fraud_classifier::types::transaction::PCA_COMPONENTS;
use card_fraud_classifier::{
    AppConfig, InferenceEngine, PipelineError, TrainingPipeline, Transaction,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::path::Path;

fn write_dataset(path: &Path, rows: usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let mut writer = csv::Writer::from_path(path).unwrap();

    let mut header = vec!["Time".to_string()];
    header.extend((1..=PCA_COMPONENTS).map(|i| format!("V{}", i)));
    header.push("Amount".to_string());
    header.push("Class".to_string());
    writer.write_record(&header).unwrap();

    for i in 0..rows {
        let fraud = i % 50 == 7;
        let mut record = vec![format!("{:.1}", i as f64 * 97.0)];
        for j in 0..PCA_COMPONENTS {
            let shift = if fraud && j < 4 { -3.5 } else { 0.0 };
            record.push(format!("{:.6}", shift + rng.gen_range(-1.0..1.0)));
        }
        let amount: f64 = if fraud {
            rng.gen_range(100.0..1500.0)
        } else {
            rng.gen_range(0.5..120.0)
        };
        record.push(format!("{:.2}", amount));
        record.push(if fraud { "1" } else { "0" }.to_string());
        writer.write_record(&record).unwrap();
    }
    writer.flush().unwrap();
}

fn config_for(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.data.path = dir.join("creditcard.csv");
    config.models.random_forest = ForestParams {
        n_trees: 12,
        max_depth: 6,
        ..Default::default()
    };
    config.models.gradient_boosting = BoostingParams {
        n_estimators: 20,
        max_depth: 3,
        ..Default::default()
    };
    config.models.isolation_forest = IsolationParams {
        n_estimators: 25,
        ..Default::default()
    };
    config.output.model_path = dir.join("out/model.bin");
    config.output.report_path = dir.join("out/report.json");
    config
}

fn transaction(v_shift: f64, amount: f64) -> HashMap<String, f64> {
    let mut v = [0.0; PCA_COMPONENTS];
    for slot in v.iter_mut().take(4) {
        *slot = v_shift;
    }
    Transaction::new(50_000.0, v, amount).to_feature_map()
}

#[test]
fn train_then_score_from_csv() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(&dir.path().join("creditcard.csv"), 2000);

    let config = config_for(dir.path());
    let report = TrainingPipeline::new(config.clone()).run().unwrap();

    assert_eq!(report.dataset_rows, 2000);
    assert_eq!(report.evaluations.len(), 4);
    assert!(report.threshold.recall >= config.threshold.target_recall);
    assert!(config.output.report_path.exists());
    for eval in &report.evaluations[..3] {
        assert!(eval.roc_auc > 0.9, "{} roc_auc {}", eval.model, eval.roc_auc);
    }

    let engine = InferenceEngine::load(&config.output.model_path).unwrap();
    assert_eq!(engine.model_name(), report.selected_model);
    assert_eq!(engine.threshold(), report.threshold.threshold);

    let fraud = engine.predict(&transaction(-3.5, 900.0)).unwrap();
    let legit = engine.predict(&transaction(0.0, 40.0)).unwrap();
    assert!((0.0..=1.0).contains(&fraud));
    assert!((0.0..=1.0).contains(&legit));
    assert!(fraud > legit);

    let mut incomplete = transaction(0.0, 40.0);
    incomplete.remove("V17");
    assert!(matches!(
        engine.predict(&incomplete),
        Err(PipelineError::Schema(_))
    ));
}

#[test]
fn missing_dataset_is_data_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = TrainingPipeline::new(config_for(dir.path())).run();
    assert!(matches!(result, Err(PipelineError::Data(_))));
}
