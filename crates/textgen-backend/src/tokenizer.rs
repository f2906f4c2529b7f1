use std::path::Path;
use std::str::FromStr;

use textgen_common::{Result, TextgenError};

use crate::InferenceBackend;

/// Text to token ids, without special tokens.
pub trait Tokenize {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
}

/// A Hugging Face `tokenizer.json`, e.g. the GPT-2 byte-level BPE.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| TextgenError::Tokenizer(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(target: "backend", "loaded tokenizer from {}", path.display());
        Ok(Self { inner })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_str(json).map_err(|e| TextgenError::Tokenizer(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl Tokenize for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.inner.encode(text, false).map_err(|e| TextgenError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }
}

/// Uses the loaded model's own vocabulary.
pub struct BackendTokenizer<'a> {
    backend: &'a dyn InferenceBackend,
}

impl<'a> BackendTokenizer<'a> {
    pub fn new(backend: &'a dyn InferenceBackend) -> Self { Self { backend } }
}

impl Tokenize for BackendTokenizer<'_> {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.backend.tokenize(text)
    }
}
