use std::collections::HashMap;
use std::path::PathBuf;

use textgen_common::config::{TextgenConfig, DEFAULT_CONTEXT_LIMIT};
use textgen_common::TextgenError;

#[test]
fn defaults_match_gpt2_pipeline_settings() {
    let cfg = TextgenConfig::default();
    assert_eq!(cfg.context_limit, DEFAULT_CONTEXT_LIMIT);
    assert_eq!(cfg.temperature, 0.9);
    assert_eq!(cfg.top_p, 0.9);
    assert_eq!(cfg.iterations, 3);
    assert_eq!(cfg.no_repeat_ngram_size, 2);
    assert_eq!(cfg.reduction_threshold, 30.0);
}

#[test]
fn env_lookup_overrides_defaults_and_skips_garbage() {
    let vars: HashMap<&str, &str> = [
        ("TEXTGEN_MODEL", "/tmp/gpt2.gguf"),
        ("TEXTGEN_ITERATIONS", "5"),
        ("TEXTGEN_SEED", "7"),
        ("TEXTGEN_TOP_P", "not-a-number"),
    ]
    .into_iter()
    .collect();
    let cfg = TextgenConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
    assert_eq!(cfg.model_path, Some(PathBuf::from("/tmp/gpt2.gguf")));
    assert_eq!(cfg.iterations, 5);
    assert_eq!(cfg.seed, Some(7));
    assert_eq!(cfg.top_p, 0.9);
    assert_eq!(cfg.model_dir, PathBuf::from("models"));
}

#[test]
fn partial_yaml_keeps_defaults() {
    let cfg = TextgenConfig::from_yaml_str("context_limit: 512\nreduction_threshold: 50.0\n").unwrap();
    assert_eq!(cfg.context_limit, 512);
    assert_eq!(cfg.reduction_threshold, 50.0);
    assert_eq!(cfg.iterations, 3);
}

#[test]
fn malformed_yaml_is_config_error() {
    let err = TextgenConfig::from_yaml_str("context_limit: [oops").unwrap_err();
    assert!(matches!(err, TextgenError::Config(_)));
}
