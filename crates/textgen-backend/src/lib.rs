//! Inference backend seam: everything model-specific (weights, tokenization,
//! decoding) sits behind [`InferenceBackend`].

use serde::Serialize;
use textgen_common::Result;

pub mod tokenizer;

pub use tokenizer::{BackendTokenizer, HfTokenizer, Tokenize};

#[derive(Debug, Clone)]
pub struct LoadParams {
    pub n_ctx: usize,
}

impl Default for LoadParams {
    fn default() -> Self {
        Self { n_ctx: textgen_common::config::DEFAULT_CONTEXT_LIMIT }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelHandle {
    pub path: String,
    pub n_ctx: usize,
}

/// Generation controls handed to the backend as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub min_new_tokens: usize,
    pub max_new_tokens: usize,
    /// `false` means greedy decoding; temperature and top-p are ignored.
    pub do_sample: bool,
    pub temperature: f32,
    pub top_p: f32,
    /// Forbid any n-gram of this size from appearing twice.
    pub no_repeat_ngram_size: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            min_new_tokens: 0,
            max_new_tokens: 50,
            do_sample: true,
            temperature: 0.9,
            top_p: 0.9,
            no_repeat_ngram_size: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    pub prompt: String,
    pub completion: String,
    /// Completion token ids, when the backend exposes them.
    pub tokens: Option<Vec<u32>>,
}

impl Generation {
    /// Prompt followed by the continuation, the way text-generation
    /// pipelines return it.
    pub fn full_text(&self) -> String {
        format!("{}{}", self.prompt, self.completion)
    }
}

pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn load_model(&self, path: &str, params: LoadParams) -> Result<ModelHandle>;
    fn tokenize(&self, text: &str) -> Result<Vec<u32>>;
    fn detokenize(&self, tokens: &[u32]) -> Result<String>;
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Generation>;
}

#[cfg(feature = "mock")]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, PoisonError};
    use textgen_common::TextgenError;

    #[derive(Default)]
    struct Vocab {
        ids: HashMap<String, u32>,
        words: Vec<String>,
    }

    impl Vocab {
        fn id(&mut self, word: &str) -> u32 {
            if let Some(&id) = self.ids.get(word) {
                return id;
            }
            let id = self.words.len() as u32;
            self.words.push(word.to_string());
            self.ids.insert(word.to_string(), id);
            id
        }
    }

    /// Deterministic stand-in for a real model. Words are tokens; ids are
    /// handed out in first-seen order.
    ///
    /// In echo mode the completion cycles through the prompt's words. In
    /// scripted mode each call replays the next canned completion and fails
    /// once the script runs out.
    #[derive(Default)]
    pub struct MockBackend {
        vocab: Mutex<Vocab>,
        script: Option<Mutex<VecDeque<String>>>,
        requests: Mutex<Vec<(String, GenerationParams)>>,
    }

    impl MockBackend {
        pub fn new() -> Self { Self::default() }

        pub fn scripted<I, S>(completions: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                script: Some(Mutex::new(completions.into_iter().map(Into::into).collect())),
                ..Self::default()
            }
        }

        /// Every `generate` call seen so far.
        pub fn requests(&self) -> Vec<(String, GenerationParams)> {
            self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        fn echo(prompt: &str, params: &GenerationParams) -> String {
            let words: Vec<&str> = prompt.split_whitespace().collect();
            let n = params.min_new_tokens.max(1).min(params.max_new_tokens);
            let mut out = String::new();
            for i in 0..n {
                out.push(' ');
                out.push_str(words.get(i % words.len().max(1)).copied().unwrap_or("lorem"));
            }
            out
        }
    }

    impl InferenceBackend for MockBackend {
        fn name(&self) -> &'static str { "mock" }

        fn load_model(&self, path: &str, params: LoadParams) -> Result<ModelHandle> {
            Ok(ModelHandle { path: path.to_string(), n_ctx: params.n_ctx })
        }

        fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
            let mut vocab = self.vocab.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(text.split_whitespace().map(|w| vocab.id(w)).collect())
        }

        fn detokenize(&self, tokens: &[u32]) -> Result<String> {
            let vocab = self.vocab.lock().unwrap_or_else(PoisonError::into_inner);
            let words = tokens
                .iter()
                .map(|&t| {
                    vocab
                        .words
                        .get(t as usize)
                        .map(String::as_str)
                        .ok_or_else(|| TextgenError::Tokenizer(format!("unknown token id {}", t)))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(words.join(" "))
        }

        fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Generation> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((prompt.to_string(), params.clone()));
            let completion = match &self.script {
                Some(script) => script
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front()
                    .ok_or_else(|| TextgenError::Inference("mock script exhausted".into()))?,
                None => Self::echo(prompt, params),
            };
            let tokens = self.tokenize(&completion)?;
            Ok(Generation { prompt: prompt.to_string(), completion, tokens: Some(tokens) })
        }
    }
}
