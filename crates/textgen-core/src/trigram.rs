use std::collections::HashMap;

/// Frequency table of overlapping `n`-token windows.
#[derive(Debug, Clone)]
pub struct NgramTable<'a> {
    windows: usize,
    counts: HashMap<&'a [u32], usize>,
}

impl<'a> NgramTable<'a> {
    /// Empty when `n == 0` or the sequence is shorter than `n`.
    pub fn build(tokens: &'a [u32], n: usize) -> Self {
        let mut counts = HashMap::new();
        let mut windows = 0;
        if n > 0 {
            for w in tokens.windows(n) {
                *counts.entry(w).or_insert(0) += 1;
                windows += 1;
            }
        }
        Self { windows, counts }
    }

    pub fn total_windows(&self) -> usize { self.windows }

    pub fn distinct(&self) -> usize { self.counts.len() }

    /// Distinct windows seen more than once.
    pub fn duplicates(&self) -> usize {
        self.counts.values().filter(|&&c| c > 1).count()
    }
}

pub fn count_duplicate_trigrams(tokens: &[u32]) -> usize {
    let table = NgramTable::build(tokens, 3);
    tracing::debug!(
        target: "trigram",
        "{} windows, {} distinct, {} repeated",
        table.total_windows(),
        table.distinct(),
        table.duplicates()
    );
    table.duplicates()
}
