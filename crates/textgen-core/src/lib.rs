//! Prompt loop, length validation, and repetition metrics around an
//! [`InferenceBackend`](textgen_backend::InferenceBackend).

pub mod bounds;
pub mod compare;
pub mod decode;
pub mod length;
pub mod session;
pub mod trigram;

pub use bounds::{LengthBounds, ValidatedBounds};
pub use compare::{RepetitionComparison, Verdict};
pub use trigram::{count_duplicate_trigrams, NgramTable};
