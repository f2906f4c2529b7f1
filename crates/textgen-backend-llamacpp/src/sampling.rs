//! Token selection over raw logits.

use rand::prelude::*;
use textgen_backend::GenerationParams;

/// Tokens that would complete an n-gram already present in `history`.
pub fn banned_ngram_tokens(history: &[u32], n: usize) -> Vec<u32> {
    if n == 0 || history.len() + 1 < n {
        return Vec::new();
    }
    let prefix = &history[history.len() + 1 - n..];
    let mut banned: Vec<u32> = history
        .windows(n)
        .filter(|w| &w[..n - 1] == prefix)
        .map(|w| w[n - 1])
        .collect();
    banned.sort_unstable();
    banned.dedup();
    banned
}

pub fn greedy(logits: &[f32]) -> usize {
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Temperature, then top-k (`0` disables), then nucleus filtering.
pub fn sample_top_k_top_p<R: Rng + ?Sized>(
    logits: &[f32],
    top_k: usize,
    top_p: f32,
    temperature: f32,
    rng: &mut R,
) -> usize {
    if logits.is_empty() { return 0; }
    let mut pairs: Vec<(usize, f32)> = logits
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_finite())
        .map(|(i, &l)| (i, l / temperature.max(1e-4)))
        .collect();
    if pairs.is_empty() { return greedy(logits); }
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    if top_k > 0 { pairs.truncate(top_k); }

    let max = pairs[0].1;
    let mut probs: Vec<(usize, f32)> = pairs.iter().map(|&(i, l)| (i, (l - max).exp())).collect();
    let sum: f32 = probs.iter().map(|p| p.1).sum();
    probs.iter_mut().for_each(|p| p.1 /= sum.max(1e-9));

    if top_p < 1.0 {
        let mut acc = 0.0_f32;
        let mut keep = 0;
        for &(_, p) in &probs { acc += p; keep += 1; if acc >= top_p { break; } }
        probs.truncate(keep);
        let z: f32 = probs.iter().map(|p| p.1).sum();
        for p in &mut probs { p.1 /= z.max(1e-9); }
    }

    let r: f32 = rng.gen();
    let mut acc = 0.0_f32;
    for &(i, p) in &probs { acc += p; if r <= acc { return i; } }
    probs[probs.len() - 1].0
}

/// Per-request sampling state.
pub struct TokenSampler {
    params: GenerationParams,
    eos: Option<u32>,
    rng: StdRng,
}

impl TokenSampler {
    pub fn new(params: &GenerationParams, eos: Option<u32>) -> Self {
        let rng = match params.seed { Some(s) => StdRng::seed_from_u64(s), None => StdRng::from_entropy() };
        Self { params: params.clone(), eos, rng }
    }

    /// `history` is prompt plus everything generated so far; `generated`
    /// counts only the new tokens.
    pub fn next_token(&mut self, logits: &mut [f32], history: &[u32], generated: usize) -> u32 {
        if let Some(n) = self.params.no_repeat_ngram_size {
            for t in banned_ngram_tokens(history, n) {
                if let Some(l) = logits.get_mut(t as usize) { *l = f32::NEG_INFINITY; }
            }
        }
        if generated < self.params.min_new_tokens {
            if let Some(l) = self.eos.and_then(|eos| logits.get_mut(eos as usize)) { *l = f32::NEG_INFINITY; }
        }
        let id = if self.params.do_sample {
            sample_top_k_top_p(logits, 0, self.params.top_p, self.params.temperature, &mut self.rng)
        } else {
            greedy(logits)
        };
        id as u32
    }

    pub fn is_eos(&self, token: u32) -> bool {
        self.eos == Some(token)
    }
}
