// Integration test: engine configuration files

use std::io::Write;

use studio_core::{EngineConfig, EngineError, TimeSignature};
use tempfile::{Builder, tempdir};

#[test]
fn test_partial_ron_keeps_defaults() {
    let mut file = Builder::new().suffix(".ron").tempfile().unwrap();
    writeln!(file, "(block_size: 128, tempo_bpm: 90.0, polyphony: 8)").unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.block_size, 128);
    assert_eq!(config.tempo_bpm, 90.0);
    assert_eq!(config.polyphony, 8);
    assert_eq!(config.lookahead_ms, EngineConfig::default().lookahead_ms);
    assert_eq!(config.fire_tolerance_ms, 10.0);
}

#[test]
fn test_json_is_detected_by_extension() {
    let mut file = Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{ "sample_rate": 44100, "time_signature": {{ "numerator": 3, "denominator": 4 }} }}"#
    )
    .unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.sample_rate, 44100);
    assert_eq!(config.time_signature, TimeSignature::three_four());
}

#[test]
fn test_out_of_range_values_are_clamped() {
    let mut file = Builder::new().suffix(".ron").tempfile().unwrap();
    writeln!(file, "(tempo_bpm: 5000.0, block_size: 1, metronome_volume: 3.0)").unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.tempo_bpm, 999.0);
    assert_eq!(config.block_size, 16);
    assert_eq!(config.metronome_volume, 1.0);
}

#[test]
fn test_save_then_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("engine.ron");
    let config = EngineConfig {
        polyphony: 24,
        metronome_enabled: true,
        ..EngineConfig::default()
    };
    config.save(&path).unwrap();
    assert_eq!(EngineConfig::load(&path).unwrap(), config);
}

#[test]
fn test_errors() {
    let mut file = Builder::new().suffix(".ron").tempfile().unwrap();
    writeln!(file, "(block_size: \"large\")").unwrap();
    assert!(matches!(EngineConfig::load(file.path()), Err(EngineError::Config(_))));

    let dir = tempdir().unwrap();
    assert!(matches!(
        EngineConfig::load(&dir.path().join("missing.ron")),
        Err(EngineError::Io(_))
    ));
}

#[test]
fn test_odd_time_signature_denominator_is_snapped() {
    let mut file = Builder::new().suffix(".ron").tempfile().unwrap();
    writeln!(file, "(time_signature: (numerator: 5, denominator: 200))").unwrap();

    let config = EngineConfig::load(file.path()).unwrap();
    assert_eq!(config.time_signature, TimeSignature::new(5, 32));
}
