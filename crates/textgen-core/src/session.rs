//! Interactive flows: read prompts, generate, print checks.

use std::io::{BufRead, Write};

use serde::Serialize;
use textgen_backend::{Generation, InferenceBackend, Tokenize};
use textgen_common::{Result, TextgenError};

use crate::bounds::LengthBounds;
use crate::compare::{RepetitionComparison, Verdict, DEFAULT_REDUCTION_THRESHOLD};
use crate::decode::{try_generate, SamplingSettings};
use crate::length::{check_count, check_words, LengthCheck, LengthUnit};
use crate::trigram::count_duplicate_trigrams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub bounds: LengthBounds,
    pub iterations: usize,
    pub unit: LengthUnit,
}

#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub prompt: String,
    pub generation: Option<Generation>,
    pub length: Option<LengthCheck>,
}

impl IterationOutcome {
    pub fn within_bounds(&self) -> bool {
        self.length.map(|l| l.within).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompareOptions {
    pub bounds: LengthBounds,
    pub no_repeat_ngram_size: usize,
    pub threshold: f64,
    pub format: OutputFormat,
}

impl CompareOptions {
    pub fn new(bounds: LengthBounds) -> Self {
        Self { bounds, no_repeat_ngram_size: 2, threshold: DEFAULT_REDUCTION_THRESHOLD, format: OutputFormat::Text }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareReport {
    pub prompt: String,
    pub baseline_text: String,
    pub constrained_text: String,
    pub no_repeat_ngram_size: usize,
    pub duplicate_trigrams: RepetitionComparison,
    pub reduction_percent: Option<f64>,
    pub threshold: f64,
    pub verdict: Verdict,
}

pub struct Session<'a, R, W> {
    backend: &'a dyn InferenceBackend,
    tokenizer: &'a dyn Tokenize,
    sampling: SamplingSettings,
    input: R,
    output: W,
}

impl<'a, R: BufRead, W: Write> Session<'a, R, W> {
    pub fn new(
        backend: &'a dyn InferenceBackend,
        tokenizer: &'a dyn Tokenize,
        sampling: SamplingSettings,
        input: R,
        output: W,
    ) -> Self {
        Self { backend, tokenizer, sampling, input, output }
    }

    pub fn into_output(self) -> W { self.output }

    /// `None` at end of input. Only the line terminator is stripped.
    fn read_prompt(&mut self, show_marker: bool) -> Result<Option<String>> {
        if show_marker {
            write!(self.output, "enter prompt: ")?;
            self.output.flush()?;
        }
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// `None` when the text cannot be tokenized.
    fn length_of(&self, text: &str, unit: LengthUnit, bounds: LengthBounds) -> Option<LengthCheck> {
        match unit {
            LengthUnit::Words => Some(check_words(text, bounds)),
            LengthUnit::Tokens => match self.tokenizer.encode(text) {
                Ok(ids) => Some(check_count(ids.len(), unit, bounds)),
                Err(e) => {
                    tracing::warn!(target: "session", "cannot measure answer in tokens: {}", e);
                    None
                }
            },
        }
    }

    fn duplicate_trigrams(&self, text: &str) -> Result<usize> {
        Ok(count_duplicate_trigrams(&self.tokenizer.encode(text)?))
    }

    /// Text mode prints the message. JSON mode emits `{"error", "stage"}`
    /// so stdout stays parseable.
    fn report_failure(&mut self, format: OutputFormat, stage: &str, message: &str) -> Result<()> {
        match format {
            OutputFormat::Text => writeln!(self.output, "{}", message)?,
            OutputFormat::Json => {
                let body = serde_json::json!({ "error": message, "stage": stage });
                serde_json::to_writer_pretty(&mut self.output, &body)
                    .map_err(|e| TextgenError::Message(e.to_string()))?;
                writeln!(self.output)?;
            }
        }
        Ok(())
    }

    pub fn run(&mut self, opts: &RunOptions) -> Result<Vec<IterationOutcome>> {
        let params = self.sampling.params(opts.bounds, None);
        let mut outcomes = Vec::with_capacity(opts.iterations);
        for i in 1..=opts.iterations {
            writeln!(self.output, "{} iteration:\n", i)?;
            let Some(prompt) = self.read_prompt(true)? else {
                writeln!(self.output)?;
                tracing::info!(target: "session", "input closed after {} iterations", i - 1);
                break;
            };

            let generation = try_generate(self.backend, &prompt, &params);
            let length = match &generation {
                Some(g) => {
                    let text = g.full_text();
                    writeln!(self.output, "answer: {}", text)?;
                    self.length_of(&text, opts.unit, opts.bounds)
                }
                None => {
                    writeln!(self.output, "failed to generate text")?;
                    None
                }
            };
            self.print_length(length.as_ref())?;

            let outcome = IterationOutcome { prompt, generation, length };
            writeln!(self.output, "\nWithin bounds?: {}", outcome.within_bounds())?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn print_length(&mut self, check: Option<&LengthCheck>) -> Result<()> {
        let Some(c) = check else {
            writeln!(self.output, "result is empty")?;
            return Ok(());
        };
        writeln!(self.output, "Length: {} {}", c.count, c.unit)?;
        let verdict = if c.within { "within" } else { "NOT within" };
        writeln!(self.output, "Length {} bounds ({}-{} {})", verdict, c.bounds.min, c.bounds.max, c.unit)?;
        Ok(())
    }

    /// Baseline and n-gram-restricted generations for one prompt. `None`
    /// when input is empty or either generation fails; the failure is
    /// written in the requested format.
    pub fn compare(&mut self, opts: &CompareOptions) -> Result<Option<CompareReport>> {
        let text_mode = opts.format == OutputFormat::Text;
        if text_mode {
            writeln!(self.output, "Enter prompt:\n")?;
        }
        let Some(prompt) = self.read_prompt(text_mode)? else {
            tracing::warn!(target: "session", "no prompt given");
            return Ok(None);
        };

        let baseline_params = self.sampling.params(opts.bounds, None);
        let Some(baseline) = try_generate(self.backend, &prompt, &baseline_params) else {
            self.report_failure(opts.format, "baseline", "failed to generate baseline")?;
            return Ok(None);
        };
        let baseline_text = baseline.full_text();
        if text_mode {
            writeln!(self.output, "Without restriction: {}", baseline_text)?;
        }

        let constrained_params = self.sampling.params(opts.bounds, Some(opts.no_repeat_ngram_size));
        let Some(constrained) = try_generate(self.backend, &prompt, &constrained_params) else {
            self.report_failure(opts.format, "constrained", "failed to generate with restriction")?;
            return Ok(None);
        };
        let constrained_text = constrained.full_text();
        if text_mode {
            writeln!(self.output, "With restriction: {}", constrained_text)?;
        }

        let comparison = RepetitionComparison::new(
            self.duplicate_trigrams(&baseline_text)?,
            self.duplicate_trigrams(&constrained_text)?,
        );
        let report = CompareReport {
            prompt,
            baseline_text,
            constrained_text,
            no_repeat_ngram_size: opts.no_repeat_ngram_size,
            duplicate_trigrams: comparison,
            reduction_percent: comparison.reduction_percent(),
            threshold: opts.threshold,
            verdict: comparison.verdict(opts.threshold),
        };
        tracing::info!(
            target: "session",
            "duplicate trigrams: baseline={} constrained={}",
            comparison.baseline,
            comparison.constrained
        );

        match opts.format {
            OutputFormat::Text => self.print_comparison(&report)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut self.output, &report)
                    .map_err(|e| TextgenError::Message(e.to_string()))?;
                writeln!(self.output)?;
            }
        }
        Ok(Some(report))
    }

    fn print_comparison(&mut self, report: &CompareReport) -> Result<()> {
        let c = report.duplicate_trigrams;
        writeln!(self.output, "\nDuplicate trigrams (baseline): {}", c.baseline)?;
        writeln!(self.output, "Duplicate trigrams (with restriction): {}", c.constrained)?;
        match report.reduction_percent {
            Some(r) => {
                writeln!(self.output, "Repetition reduction: {:.1}%", r)?;
                match report.verdict {
                    Verdict::Met => writeln!(self.output, "Condition met: reduction >= {}%", report.threshold)?,
                    _ => writeln!(self.output, "Condition not met: reduction < {}%", report.threshold)?,
                }
            }
            None => writeln!(self.output, "Baseline has no repeated trigrams; restriction not applicable")?,
        }
        Ok(())
    }
}
