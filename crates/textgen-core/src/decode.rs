use textgen_backend::{Generation, GenerationParams, InferenceBackend};
use textgen_common::config::TextgenConfig;
use textgen_common::Result;

use crate::bounds::LengthBounds;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub seed: Option<u64>,
}

impl SamplingSettings {
    pub fn from_config(cfg: &TextgenConfig) -> Self {
        Self { temperature: cfg.temperature, top_p: cfg.top_p, seed: cfg.seed }
    }

    /// Bounds become min/max *new* tokens.
    pub fn params(&self, bounds: LengthBounds, no_repeat_ngram_size: Option<usize>) -> GenerationParams {
        GenerationParams {
            min_new_tokens: bounds.min,
            max_new_tokens: bounds.max,
            do_sample: true,
            temperature: self.temperature,
            top_p: self.top_p,
            no_repeat_ngram_size,
            seed: self.seed,
        }
    }
}

pub fn generate_once(
    backend: &dyn InferenceBackend,
    prompt: &str,
    params: &GenerationParams,
) -> Result<Generation> {
    tracing::debug!(
        target: "decode",
        "generate via {} (new tokens {}..={}, no_repeat_ngram={:?})",
        backend.name(),
        params.min_new_tokens,
        params.max_new_tokens,
        params.no_repeat_ngram_size
    );
    let generation = backend.generate(prompt, params)?;
    if let Some(tokens) = &generation.tokens {
        tracing::debug!(target: "decode", "{} new tokens", tokens.len());
    }
    Ok(generation)
}

/// Failures are logged and become `None`.
pub fn try_generate(
    backend: &dyn InferenceBackend,
    prompt: &str,
    params: &GenerationParams,
) -> Option<Generation> {
    match generate_once(backend, prompt, params) {
        Ok(g) => Some(g),
        Err(e) => {
            tracing::error!(target: "decode", "generation failed: {}", e);
            None
        }
    }
}
