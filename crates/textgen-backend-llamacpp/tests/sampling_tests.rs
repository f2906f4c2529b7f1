use rand::{rngs::StdRng, SeedableRng};
use textgen_backend::{GenerationParams, InferenceBackend, LoadParams};
use textgen_backend_llamacpp::sampling::{banned_ngram_tokens, greedy, sample_top_k_top_p, TokenSampler};
use textgen_backend_llamacpp::LlamaCppBackend;

#[test]
fn sample_is_deterministic_with_seed() {
    let logits = vec![0.1, 0.2, 0.3, 0.4];
    let a = sample_top_k_top_p(&logits, 0, 1.0, 1.0, &mut StdRng::seed_from_u64(42));
    let b = sample_top_k_top_p(&logits, 0, 1.0, 1.0, &mut StdRng::seed_from_u64(42));
    assert_eq!(a, b);
}

#[test]
fn top_k_one_is_greedy() {
    let logits = vec![0.5, 3.0, -1.0, 2.9];
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..20 {
        assert_eq!(sample_top_k_top_p(&logits, 1, 1.0, 0.9, &mut rng), 1);
    }
    assert_eq!(greedy(&logits), 1);
}

#[test]
fn masked_logits_are_never_sampled() {
    let logits = vec![f32::NEG_INFINITY, 1.0, f32::NEG_INFINITY, 1.0];
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let t = sample_top_k_top_p(&logits, 0, 0.9, 0.9, &mut rng);
        assert!(t == 1 || t == 3);
    }
}

#[test]
fn ngram_ban_follows_existing_bigrams() {
    // history ends in 1; bigrams starting with 1 are (1,2) and (1,4)
    assert_eq!(banned_ngram_tokens(&[1, 2, 3, 1, 4, 1], 2), vec![2, 4]);
    // trigram prefix (5,6) seen once, followed by 7
    assert_eq!(banned_ngram_tokens(&[5, 6, 7, 5, 6], 3), vec![7]);
    assert!(banned_ngram_tokens(&[5, 6], 3).is_empty());
    assert!(banned_ngram_tokens(&[1, 2, 3], 0).is_empty());
}

#[test]
fn sampler_applies_ban_and_min_tokens() {
    let params = GenerationParams {
        min_new_tokens: 2,
        do_sample: false,
        no_repeat_ngram_size: Some(2),
        ..Default::default()
    };
    let eos = 0;
    let mut sampler = TokenSampler::new(&params, Some(eos));

    // EOS is the best logit but suppressed before min_new_tokens; token 2 is banned by (1,2).
    let mut logits = vec![10.0, 1.0, 9.0, 5.0];
    assert_eq!(sampler.next_token(&mut logits, &[1, 2, 1], 0), 3);

    let mut logits = vec![10.0, 1.0, 9.0, 5.0];
    let t = sampler.next_token(&mut logits, &[3, 3], 2);
    assert!(sampler.is_eos(t));
}

#[test]
fn availability_matches_build() {
    let backend = LlamaCppBackend::new();
    assert_eq!(backend.name(), "llama.cpp");
    if !LlamaCppBackend::is_available() {
        assert!(backend.load_model("missing.gguf", LoadParams::default()).is_err());
    }
}
