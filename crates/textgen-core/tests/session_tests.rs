use std::io::Cursor;

use textgen_backend::mock::MockBackend;
use textgen_backend::{BackendTokenizer, Tokenize};
use textgen_common::{Result, TextgenError};
use textgen_core::decode::SamplingSettings;
use textgen_core::length::LengthUnit;
use textgen_core::session::{CompareOptions, OutputFormat, RunOptions, Session};
use textgen_core::{LengthBounds, Verdict};

fn run_session<T>(
    backend: &MockBackend,
    stdin: &str,
    f: impl FnOnce(&mut Session<'_, Cursor<Vec<u8>>, Vec<u8>>) -> T,
) -> (T, String) {
    let tokenizer = BackendTokenizer::new(backend);
    let mut session = Session::new(
        backend,
        &tokenizer,
        SamplingSettings { temperature: 0.9, top_p: 0.9, seed: Some(1) },
        Cursor::new(stdin.as_bytes().to_vec()),
        Vec::new(),
    );
    let out = f(&mut session);
    let text = String::from_utf8(session.into_output()).unwrap();
    (out, text)
}

#[test]
fn run_loop_checks_word_length_and_stops_at_eof() {
    let backend = MockBackend::scripted([" a b c", " x"]);
    let opts = RunOptions { bounds: LengthBounds { min: 1, max: 4 }, iterations: 3, unit: LengthUnit::Words };
    let (outcomes, out) = run_session(&backend, "hello world\nsecond\n", |s| s.run(&opts).unwrap());

    assert_eq!(outcomes.len(), 2);
    assert!(!outcomes[0].within_bounds(), "5 words is over the max of 4");
    assert!(outcomes[1].within_bounds());
    assert_eq!(outcomes[1].prompt, "second");

    assert!(out.contains("1 iteration:"));
    assert!(out.contains("answer: hello world a b c"));
    assert!(out.contains("Length: 5 words"));
    assert!(out.contains("Length NOT within bounds (1-4 words)"));
    assert!(out.contains("answer: second x"));
    assert!(out.contains("Within bounds?: true"));
    assert_eq!(backend.requests().len(), 2);

    let requests = backend.requests();
    assert_eq!(requests[0].1.min_new_tokens, 1);
    assert_eq!(requests[0].1.max_new_tokens, 4);
    assert_eq!(requests[0].1.no_repeat_ngram_size, None);
}

#[test]
fn run_loop_reports_null_result_on_failure() {
    let backend = MockBackend::scripted(Vec::<String>::new());
    let opts = RunOptions { bounds: LengthBounds { min: 1, max: 10 }, iterations: 1, unit: LengthUnit::Words };
    let (outcomes, out) = run_session(&backend, "anything\n", |s| s.run(&opts).unwrap());

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].generation.is_none());
    assert!(out.contains("failed to generate text"));
    assert!(out.contains("result is empty"));
    assert!(out.contains("Within bounds?: false"));
}

#[test]
fn run_loop_can_count_tokens() {
    let backend = MockBackend::new();
    let opts = RunOptions { bounds: LengthBounds { min: 3, max: 3 }, iterations: 1, unit: LengthUnit::Tokens };
    let (outcomes, out) = run_session(&backend, "one two\n", |s| s.run(&opts).unwrap());
    // prompt (2) + echo of min_new_tokens (3)
    assert_eq!(outcomes[0].length.map(|l| l.count), Some(5));
    assert!(out.contains("Length: 5 tokens"));
}

#[test]
fn compare_reports_reduction() {
    let backend = MockBackend::scripted([" the cat sat the cat sat the cat sat", " the cat sat on a mat"]);
    let opts = CompareOptions::new(LengthBounds { min: 5, max: 20 });
    let (report, out) = run_session(&backend, "p\n", |s| s.compare(&opts).unwrap());
    let report = report.expect("both generations succeed");

    assert_eq!(report.duplicate_trigrams.baseline, 3);
    assert_eq!(report.duplicate_trigrams.constrained, 0);
    assert_eq!(report.verdict, Verdict::Met);

    assert!(out.contains("Without restriction: p the cat sat the cat sat the cat sat"));
    assert!(out.contains("With restriction: p the cat sat on a mat"));
    assert!(out.contains("Duplicate trigrams (baseline): 3"));
    assert!(out.contains("Duplicate trigrams (with restriction): 0"));
    assert!(out.contains("Repetition reduction: 100.0%"));
    assert!(out.contains("Condition met: reduction >= 30%"));

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].1.no_repeat_ngram_size, None);
    assert_eq!(requests[1].1.no_repeat_ngram_size, Some(2));
}

#[test]
fn compare_without_baseline_repeats() {
    let backend = MockBackend::scripted([" a b c d", " e f g h"]);
    let opts = CompareOptions::new(LengthBounds { min: 1, max: 10 });
    let (report, out) = run_session(&backend, "p\n", |s| s.compare(&opts).unwrap());
    assert_eq!(report.unwrap().verdict, Verdict::NotApplicable);
    assert!(out.contains("restriction not applicable"));
}

#[test]
fn compare_below_threshold() {
    let backend = MockBackend::scripted([" x y z x y z", " x y z x y z"]);
    let opts = CompareOptions::new(LengthBounds { min: 1, max: 10 });
    let (report, out) = run_session(&backend, "p\n", |s| s.compare(&opts).unwrap());
    assert_eq!(report.unwrap().reduction_percent, Some(0.0));
    assert!(out.contains("Repetition reduction: 0.0%"));
    assert!(out.contains("Condition not met: reduction < 30%"));
}

#[test]
fn compare_stops_when_baseline_fails() {
    let backend = MockBackend::scripted(Vec::<String>::new());
    let opts = CompareOptions::new(LengthBounds { min: 1, max: 10 });
    let (report, out) = run_session(&backend, "p\n", |s| s.compare(&opts).unwrap());
    assert!(report.is_none());
    assert!(out.contains("failed to generate baseline"));
    assert_eq!(backend.requests().len(), 1);
}

#[test]
fn compare_json_output() {
    let backend = MockBackend::scripted([" a a a a", " a b"]);
    let opts = CompareOptions { format: OutputFormat::Json, ..CompareOptions::new(LengthBounds { min: 1, max: 10 }) };
    let (_, out) = run_session(&backend, "p\n", |s| s.compare(&opts).unwrap());

    assert!(!out.contains("enter prompt"));
    let v: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(v["duplicate_trigrams"]["baseline"], 1);
    assert_eq!(v["duplicate_trigrams"]["constrained"], 0);
    assert_eq!(v["verdict"], "met");
    assert_eq!(v["no_repeat_ngram_size"], 2);
}

#[test]
fn compare_stops_when_constrained_fails() {
    let backend = MockBackend::scripted([" a a a"]);
    let opts = CompareOptions::new(LengthBounds { min: 1, max: 10 });
    let (report, out) = run_session(&backend, "p\n", |s| s.compare(&opts).unwrap());
    assert!(report.is_none());
    assert!(out.contains("Without restriction: p a a a"));
    assert!(out.contains("failed to generate with restriction"));
    assert!(!out.contains("Duplicate trigrams"));
    assert_eq!(backend.requests().len(), 2);
}

#[test]
fn compare_json_failure_stays_json() {
    let backend = MockBackend::scripted([" a a a a"]);
    let opts = CompareOptions { format: OutputFormat::Json, ..CompareOptions::new(LengthBounds { min: 1, max: 10 }) };
    let (report, out) = run_session(&backend, "p\n", |s| s.compare(&opts).unwrap());
    assert!(report.is_none());

    let v: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(v["stage"], "constrained");
    assert_eq!(v["error"], "failed to generate with restriction");
}

#[test]
fn compare_json_baseline_failure() {
    let backend = MockBackend::scripted(Vec::<String>::new());
    let opts = CompareOptions { format: OutputFormat::Json, ..CompareOptions::new(LengthBounds { min: 1, max: 10 }) };
    let (_, out) = run_session(&backend, "p\n", |s| s.compare(&opts).unwrap());
    let v: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(v["stage"], "baseline");
}

struct BrokenTokenizer;

impl Tokenize for BrokenTokenizer {
    fn encode(&self, _text: &str) -> Result<Vec<u32>> {
        Err(TextgenError::Tokenizer("vocabulary missing".into()))
    }
}

#[test]
fn token_count_failure_does_not_end_run_loop() {
    let backend = MockBackend::new();
    let tokenizer = BrokenTokenizer;
    let mut session = Session::new(
        &backend,
        &tokenizer,
        SamplingSettings { temperature: 0.9, top_p: 0.9, seed: Some(1) },
        Cursor::new(b"one\ntwo\n".to_vec()),
        Vec::new(),
    );
    let opts = RunOptions { bounds: LengthBounds { min: 1, max: 5 }, iterations: 2, unit: LengthUnit::Tokens };
    let outcomes = session.run(&opts).unwrap();
    let out = String::from_utf8(session.into_output()).unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.generation.is_some() && o.length.is_none()));
    assert!(out.contains("result is empty"));
    assert!(out.contains("Within bounds?: false"));
}
