use serde::Serialize;

pub const DEFAULT_REDUCTION_THRESHOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Met,
    NotMet,
    /// Baseline had nothing to reduce.
    NotApplicable,
}

/// Duplicate-trigram counts with and without an n-gram restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepetitionComparison {
    pub baseline: usize,
    pub constrained: usize,
}

impl RepetitionComparison {
    pub fn new(baseline: usize, constrained: usize) -> Self {
        Self { baseline, constrained }
    }

    /// Negative when the constrained run repeated more.
    pub fn reduction_percent(&self) -> Option<f64> {
        if self.baseline == 0 {
            return None;
        }
        let b = self.baseline as f64;
        Some((b - self.constrained as f64) / b * 100.0)
    }

    pub fn verdict(&self, threshold: f64) -> Verdict {
        match self.reduction_percent() {
            None => Verdict::NotApplicable,
            Some(r) if r >= threshold => Verdict::Met,
            Some(_) => Verdict::NotMet,
        }
    }
}
