//! GGUF models (GPT-2 and friends) through llama.cpp.
//!
//! Bindings only exist when the build script found llama.cpp; otherwise
//! every call fails with `BackendUnavailable`.

use std::sync::{Arc, Mutex};

use textgen_backend::{Generation, GenerationParams, InferenceBackend, LoadParams, ModelHandle};
#[cfg(llama_ffi)]
use textgen_common::TextgenError;
use textgen_common::Result;

pub mod sampling;

/// Splits a context window between prompt and completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    pub n_ctx: usize,
    pub max_new_tokens: usize,
}

impl ContextBudget {
    pub fn new(n_ctx: usize, max_new_tokens: usize) -> Self {
        Self { n_ctx, max_new_tokens }
    }

    /// Prompt tokens kept. Never less than half the window, so a request
    /// for the whole window still conditions on its prompt.
    pub fn prompt_window(&self) -> usize {
        let reserved = self.n_ctx.saturating_sub(self.max_new_tokens);
        reserved.max(self.n_ctx / 2).max(1)
    }

    /// Drops the head of an over-long prompt; returns how many were dropped.
    pub fn fit_prompt<T>(&self, tokens: &mut Vec<T>) -> usize {
        let cut = tokens.len().saturating_sub(self.prompt_window());
        tokens.drain(..cut);
        cut
    }

    /// New tokens that fit after a prompt of `prompt_len` tokens.
    pub fn completion_room(&self, prompt_len: usize) -> usize {
        self.n_ctx.saturating_sub(prompt_len).min(self.max_new_tokens)
    }
}

#[cfg(llama_ffi)]
#[allow(non_upper_case_globals, non_camel_case_types, non_snake_case, dead_code)]
mod ffi {
    include!(concat!(env!("OUT_DIR"), "/llama_bindings.rs"));
}

#[derive(Default, Clone)]
pub struct LlamaCppBackend {
    #[cfg_attr(not(llama_ffi), allow(dead_code))]
    state: Arc<Mutex<State>>,
}

#[cfg(llama_ffi)]
struct LoadedModel {
    model: *mut ffi::llama_model,
    n_ctx: u32,
}

// The model is only touched while holding the state lock.
#[cfg(llama_ffi)]
unsafe impl Send for LoadedModel {}

#[cfg(llama_ffi)]
impl Drop for LoadedModel {
    fn drop(&mut self) {
        unsafe { ffi::llama_free_model(self.model) }
    }
}

#[derive(Default)]
struct State {
    #[cfg(llama_ffi)]
    loaded: Option<LoadedModel>,
}

impl LlamaCppBackend {
    pub fn new() -> Self { Self::default() }

    pub fn is_available() -> bool { cfg!(llama_ffi) }
}

#[cfg(not(llama_ffi))]
fn unavailable<T>() -> Result<T> {
    Err(textgen_common::TextgenError::BackendUnavailable(
        "built without llama.cpp; set LLAMA_CPP_DIR and rebuild, or run with --mock".into(),
    ))
}

#[cfg(not(llama_ffi))]
impl InferenceBackend for LlamaCppBackend {
    fn name(&self) -> &'static str { "llama.cpp" }
    fn load_model(&self, _path: &str, _params: LoadParams) -> Result<ModelHandle> { unavailable() }
    fn tokenize(&self, _text: &str) -> Result<Vec<u32>> { unavailable() }
    fn detokenize(&self, _tokens: &[u32]) -> Result<String> { unavailable() }
    fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<Generation> { unavailable() }
}

#[cfg(llama_ffi)]
impl LlamaCppBackend {
    fn with_model<T>(&self, f: impl FnOnce(&LoadedModel) -> Result<T>) -> Result<T> {
        let st = self.state.lock().map_err(|_| TextgenError::Message("llama state poisoned".into()))?;
        let loaded = st.loaded.as_ref().ok_or_else(|| TextgenError::Inference("model not loaded".into()))?;
        f(loaded)
    }

    unsafe fn tokenize_raw(model: *mut ffi::llama_model, text: &str, add_special: bool) -> Result<Vec<ffi::llama_token>> {
        let ctext = std::ffi::CString::new(text).map_err(|e| TextgenError::InvalidArgument(e.to_string()))?;
        let len = text.len() as i32;
        // A negative return is the required buffer size.
        let needed = -ffi::llama_tokenize(model, ctext.as_ptr(), len, std::ptr::null_mut(), 0, add_special, false);
        if needed <= 0 { return Ok(Vec::new()); }
        let mut toks: Vec<ffi::llama_token> = vec![0; needed as usize];
        let n = ffi::llama_tokenize(model, ctext.as_ptr(), len, toks.as_mut_ptr(), toks.len() as i32, add_special, false);
        if n < 0 { return Err(TextgenError::Tokenizer("llama_tokenize failed".into())); }
        toks.truncate(n as usize);
        Ok(toks)
    }

    unsafe fn piece(model: *mut ffi::llama_model, token: ffi::llama_token) -> String {
        let mut buf: Vec<u8> = vec![0; 64];
        let mut n = ffi::llama_token_to_piece(model, token, buf.as_mut_ptr() as *mut _, buf.len() as i32);
        if n < 0 {
            buf.resize((-n) as usize, 0);
            n = ffi::llama_token_to_piece(model, token, buf.as_mut_ptr() as *mut _, buf.len() as i32);
        }
        if n <= 0 { return String::new(); }
        String::from_utf8_lossy(&buf[..n as usize]).into_owned()
    }

    unsafe fn decode_batch(ctx: *mut ffi::llama_context, toks: &mut [ffi::llama_token], n_past: i32) -> Result<()> {
        let batch = ffi::llama_batch_get_one(toks.as_mut_ptr(), toks.len() as i32, n_past, 0);
        if ffi::llama_decode(ctx, batch) != 0 {
            return Err(TextgenError::Inference("llama_decode failed".into()));
        }
        Ok(())
    }
}

#[cfg(llama_ffi)]
impl InferenceBackend for LlamaCppBackend {
    fn name(&self) -> &'static str { "llama.cpp" }

    fn load_model(&self, path: &str, params: LoadParams) -> Result<ModelHandle> {
        let cpath = std::ffi::CString::new(path).map_err(|e| TextgenError::InvalidArgument(e.to_string()))?;
        let model = unsafe {
            ffi::llama_backend_init();
            ffi::llama_load_model_from_file(cpath.as_ptr(), ffi::llama_model_default_params())
        };
        if model.is_null() {
            return Err(TextgenError::ModelLoad(format!("llama_load_model_from_file failed for {}", path)));
        }
        let mut st = self.state.lock().map_err(|_| TextgenError::Message("llama state poisoned".into()))?;
        st.loaded = Some(LoadedModel { model, n_ctx: params.n_ctx as u32 });
        tracing::info!(target: "backend", "llama.cpp loaded {} (n_ctx={})", path, params.n_ctx);
        Ok(ModelHandle { path: path.to_string(), n_ctx: params.n_ctx })
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        self.with_model(|m| unsafe { Self::tokenize_raw(m.model, text, false) })
            .map(|toks| toks.into_iter().map(|t| t as u32).collect())
    }

    fn detokenize(&self, tokens: &[u32]) -> Result<String> {
        self.with_model(|m| Ok(tokens.iter().map(|&t| unsafe { Self::piece(m.model, t as ffi::llama_token) }).collect()))
    }

    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Generation> {
        self.with_model(|m| unsafe {
            let mut cparams = ffi::llama_context_default_params();
            cparams.n_ctx = m.n_ctx;
            let ctx = ffi::llama_new_context_with_model(m.model, cparams);
            if ctx.is_null() {
                return Err(TextgenError::Inference("llama_new_context_with_model failed".into()));
            }
            let result = Self::run_generation(m.model, ctx, m.n_ctx as usize, prompt, params);
            ffi::llama_free(ctx);
            result
        })
    }
}

#[cfg(llama_ffi)]
impl LlamaCppBackend {
    unsafe fn run_generation(
        model: *mut ffi::llama_model,
        ctx: *mut ffi::llama_context,
        n_ctx: usize,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<Generation> {
        let mut prompt_toks = Self::tokenize_raw(model, prompt, true)?;
        let budget = ContextBudget::new(n_ctx, params.max_new_tokens);
        let original_len = prompt_toks.len();
        let cut = budget.fit_prompt(&mut prompt_toks);
        if cut > 0 {
            tracing::warn!(
                target: "backend",
                "prompt truncated from {} to its last {} tokens (n_ctx={}, max_new_tokens={})",
                original_len,
                prompt_toks.len(),
                n_ctx,
                params.max_new_tokens
            );
        }
        if prompt_toks.is_empty() {
            return Err(TextgenError::InvalidArgument("prompt produced no tokens".into()));
        }
        let room = budget.completion_room(prompt_toks.len());
        if room < params.max_new_tokens {
            tracing::warn!(
                target: "backend",
                "only {} of {} requested new tokens fit in the context",
                room,
                params.max_new_tokens
            );
        }
        Self::decode_batch(ctx, &mut prompt_toks, 0)?;

        let vocab = ffi::llama_n_vocab(model) as usize;
        let eos = ffi::llama_token_eos(model);
        let mut sampler = sampling::TokenSampler::new(params, Some(eos as u32));
        let mut history: Vec<u32> = prompt_toks.iter().map(|&t| t as u32).collect();
        let mut n_past = prompt_toks.len() as i32;
        let mut out_tokens: Vec<u32> = Vec::new();
        let mut completion = String::new();

        while out_tokens.len() < params.max_new_tokens && (n_past as usize) < n_ctx {
            let logits_ptr = ffi::llama_get_logits(ctx);
            if logits_ptr.is_null() {
                return Err(TextgenError::Inference("no logits".into()));
            }
            let mut logits = std::slice::from_raw_parts(logits_ptr, vocab).to_vec();
            let next = sampler.next_token(&mut logits, &history, out_tokens.len());
            if sampler.is_eos(next) { break; }
            completion.push_str(&Self::piece(model, next as ffi::llama_token));
            out_tokens.push(next);
            history.push(next);
            let mut one = [next as ffi::llama_token];
            Self::decode_batch(ctx, &mut one, n_past)?;
            n_past += 1;
        }
        if out_tokens.len() < params.min_new_tokens && (n_past as usize) >= n_ctx {
            tracing::warn!(
                target: "backend",
                "context full after {} new tokens, below min_new_tokens={}",
                out_tokens.len(),
                params.min_new_tokens
            );
        }
        tracing::debug!(target: "backend", "generated {} tokens", out_tokens.len());
        Ok(Generation { prompt: prompt.to_string(), completion, tokens: Some(out_tokens) })
    }
}
