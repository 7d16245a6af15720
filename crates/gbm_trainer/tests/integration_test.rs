//! End-to-end tests: CSV on disk through training to a saved model.

use gbm_core::Model;
use gbm_trainer::{train_from_csv, StopReason, Trainer, TrainerConfig, TrainerError};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// 50 rows, separable on feature 0 at 24.5; feature 1 is noise
fn write_separable_csv(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("data.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "label,x,noise").unwrap();
    for i in 0..50 {
        let x = i * 7 % 50;
        let label = if x >= 25 { 1 } else { 0 };
        writeln!(file, "{},{},{}", label, x, i * 13 % 17).unwrap();
    }
    path
}

fn config_for(dir: &TempDir, input: &Path) -> TrainerConfig {
    let mut config = TrainerConfig::default();
    config.data.input = input.to_path_buf();
    config.data.output = dir.path().join("model.txt");
    config
}

#[test]
fn test_default_run_stops_early_and_saves() {
    let dir = TempDir::new().unwrap();
    let input = write_separable_csv(dir.path());
    let trainer = Trainer::new(config_for(&dir, &input));

    let outcome = trainer.run().unwrap();

    assert_eq!(outcome.train_rows, 40);
    assert_eq!(outcome.valid_rows, 10);
    assert_eq!(outcome.num_features, 2);

    // Validation accuracy is perfect after the first round and never improves
    assert_eq!(outcome.stop_reason, StopReason::EarlyStopped);
    assert_eq!(outcome.history.len(), 11);
    assert_eq!(outcome.best_iteration, 1);
    assert_eq!(outcome.num_trees, 1);

    let first = &outcome.history[0];
    assert_eq!(first.iteration, 0);
    assert_eq!(first.valid["accuracy"], 1.0);
    assert_eq!(first.valid["auc"], 1.0);
    assert!(first.train.contains_key("binary_logloss"));
}

#[test]
fn test_saved_model_reloads() {
    let dir = TempDir::new().unwrap();
    let input = write_separable_csv(dir.path());
    let output = dir.path().join("LGBM_model.txt");

    let outcome = train_from_csv(&input, &output).unwrap();
    assert_eq!(outcome.model_path, output);

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(outcome.model_hash, hex::encode(blake3::hash(&bytes).as_bytes()));

    let text = String::from_utf8(bytes).unwrap();
    assert!(text.starts_with("tree\n"));
    assert!(text.contains("[objective: binary]"));

    let model = Model::load(&output).unwrap();
    assert_eq!(model.num_trees(), outcome.num_trees);
    assert!(model.predict(&[45.0, 3.0]) > 0.5);
    assert!(model.predict(&[5.0, 3.0]) < 0.5);
}

#[test]
fn test_report_round_trips() {
    let dir = TempDir::new().unwrap();
    let input = write_separable_csv(dir.path());
    let outcome = Trainer::new(config_for(&dir, &input)).run().unwrap();

    let report = dir.path().join("report.json");
    outcome.write_report(&report).unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();

    assert_eq!(parsed["best_iteration"], 1);
    assert_eq!(parsed["stop_reason"]["reason"], "early_stopped");
    assert_eq!(parsed["history"].as_array().unwrap().len(), outcome.history.len());
}

#[test]
fn test_failed_round_ends_loop_and_still_saves() {
    let dir = TempDir::new().unwrap();
    let input = write_separable_csv(dir.path());
    let mut config = config_for(&dir, &input);
    // Infinite positive weight makes the first round's gradients non-finite
    config.booster.scale_pos_weight = f64::INFINITY;

    let outcome = Trainer::new(config).run().unwrap();

    match &outcome.stop_reason {
        StopReason::IterationFailed { iteration, message } => {
            assert_eq!(*iteration, 0);
            assert!(message.contains("non-finite"));
        }
        other => panic!("unexpected stop reason: {other:?}"),
    }
    assert!(outcome.history.is_empty());
    assert_eq!(outcome.num_trees, 0);

    let output = dir.path().join("model.txt");
    assert!(output.exists());
    let model = Model::load(&output).unwrap();
    assert_eq!(model.num_trees(), 0);
}

#[test]
fn test_single_row_fails_dataset_creation() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("one.csv");
    std::fs::write(&input, "label,x\n1,2\n").unwrap();

    let err = Trainer::new(config_for(&dir, &input)).run().unwrap_err();
    assert!(matches!(err, TrainerError::Engine { .. }));
    assert!(err.to_string().contains("zero rows"));
    assert!(!dir.path().join("model.txt").exists());
}

#[test]
fn test_header_only_is_empty_dataset() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("empty.csv");
    std::fs::write(&input, "label,x,y\n").unwrap();

    let err = Trainer::new(config_for(&dir, &input)).run().unwrap_err();
    assert!(matches!(err, TrainerError::EmptyDataset));
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("absent.csv");
    let err = Trainer::new(config_for(&dir, &input)).run().unwrap_err();
    assert!(matches!(err, TrainerError::Io { .. }));
}

#[test]
fn test_non_binary_labels_abort_booster_creation() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("multi.csv");
    let mut content = String::from("label,x\n");
    for i in 0..10 {
        content.push_str(&format!("{},{}\n", i % 3, i));
    }
    std::fs::write(&input, content).unwrap();

    let err = Trainer::new(config_for(&dir, &input)).run().unwrap_err();
    match err {
        TrainerError::Engine { step, .. } => assert_eq!(step, "booster creation"),
        other => panic!("unexpected error: {other}"),
    }
}
