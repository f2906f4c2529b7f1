pub type Result<T> = core::result::Result<T, TextgenError>;

#[derive(thiserror::Error, Debug)]
pub enum TextgenError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

pub mod config {
    use crate::{Result, TextgenError};
    use serde::{Deserialize, Serialize};
    use std::env;
    use std::path::{Path, PathBuf};

    /// GPT-2 positional limit.
    pub const DEFAULT_CONTEXT_LIMIT: usize = 1024;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct TextgenConfig {
        pub model_dir: PathBuf,
        pub model_path: Option<PathBuf>,
        pub tokenizer_path: Option<PathBuf>,
        pub context_limit: usize,
        pub temperature: f32,
        pub top_p: f32,
        pub seed: Option<u64>,
        pub iterations: usize,
        pub no_repeat_ngram_size: usize,
        pub reduction_threshold: f64,
    }

    impl Default for TextgenConfig {
        fn default() -> Self {
            Self {
                model_dir: PathBuf::from("models"),
                model_path: None,
                tokenizer_path: None,
                context_limit: DEFAULT_CONTEXT_LIMIT,
                temperature: 0.9,
                top_p: 0.9,
                seed: None,
                iterations: 3,
                no_repeat_ngram_size: 2,
                reduction_threshold: 30.0,
            }
        }
    }

    impl TextgenConfig {
        /// `TEXTGEN_CONFIG` names a YAML file; without it, defaults are
        /// overlaid with `TEXTGEN_*` environment variables.
        pub fn load() -> Result<Self> {
            if let Ok(path) = env::var("TEXTGEN_CONFIG") {
                return Self::from_yaml_file(path);
            }
            Ok(Self::from_lookup(|key| env::var(key).ok()))
        }

        pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path)?;
            Self::from_yaml_str(&text).map_err(|e| TextgenError::Config(format!("{}: {}", path.display(), e)))
        }

        pub fn from_yaml_str(text: &str) -> Result<Self> {
            serde_yaml::from_str(text).map_err(|e| TextgenError::Config(e.to_string()))
        }

        /// Unparseable values are ignored and the default kept.
        pub fn from_lookup<F: Fn(&str) -> Option<String>>(get: F) -> Self {
            let mut cfg = Self::default();
            if let Some(dir) = get("TEXTGEN_MODEL_DIR") { cfg.model_dir = PathBuf::from(dir); }
            if let Some(p) = get("TEXTGEN_MODEL") { cfg.model_path = Some(PathBuf::from(p)); }
            if let Some(p) = get("TEXTGEN_TOKENIZER") { cfg.tokenizer_path = Some(PathBuf::from(p)); }
            if let Some(v) = get("TEXTGEN_CONTEXT_LIMIT").and_then(|v| v.parse().ok()) { cfg.context_limit = v; }
            if let Some(v) = get("TEXTGEN_TEMPERATURE").and_then(|v| v.parse().ok()) { cfg.temperature = v; }
            if let Some(v) = get("TEXTGEN_TOP_P").and_then(|v| v.parse().ok()) { cfg.top_p = v; }
            if let Some(v) = get("TEXTGEN_SEED").and_then(|v| v.parse().ok()) { cfg.seed = Some(v); }
            if let Some(v) = get("TEXTGEN_ITERATIONS").and_then(|v| v.parse().ok()) { cfg.iterations = v; }
            if let Some(v) = get("TEXTGEN_NO_REPEAT_NGRAM").and_then(|v| v.parse().ok()) { cfg.no_repeat_ngram_size = v; }
            if let Some(v) = get("TEXTGEN_REDUCTION_THRESHOLD").and_then(|v| v.parse().ok()) { cfg.reduction_threshold = v; }
            cfg
        }
    }
}
