use serde::Serialize;
use textgen_common::{Result, TextgenError};

/// Inclusive `[min, max]` length window for a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LengthBounds {
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedBounds {
    pub bounds: LengthBounds,
    /// Requested maximum when it exceeded the model limit.
    pub clamped_from: Option<u64>,
}

impl LengthBounds {
    pub fn parse(min_raw: &str, max_raw: &str, limit: usize) -> Result<ValidatedBounds> {
        let (Ok(min), Ok(max)) = (min_raw.trim().parse::<i64>(), max_raw.trim().parse::<i64>()) else {
            return Err(TextgenError::InvalidArgument("min_length and max_length must be integers".into()));
        };
        Self::validate(min, max, limit)
    }

    /// Rejects non-positive or inverted bounds and clamps `max` to `limit`.
    pub fn validate(min: i64, max: i64, limit: usize) -> Result<ValidatedBounds> {
        if min <= 0 {
            return Err(TextgenError::InvalidArgument("min_length must be positive".into()));
        }
        if max <= 0 {
            return Err(TextgenError::InvalidArgument("max_length must be positive".into()));
        }
        if min > max {
            return Err(TextgenError::InvalidArgument("min_length cannot exceed max_length".into()));
        }
        let limit_i = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut clamped_from = None;
        let mut capped = max;
        if max > limit_i {
            tracing::warn!(target: "bounds", "max_length {} exceeds model limit {}, clamping", max, limit);
            clamped_from = Some(max as u64);
            capped = limit_i;
        }
        if min > capped {
            return Err(TextgenError::InvalidArgument(format!(
                "min_length {} exceeds the model limit of {} tokens",
                min, limit
            )));
        }
        let to_usize = |v: i64| {
            usize::try_from(v).map_err(|_| TextgenError::InvalidArgument(format!("{} does not fit this platform", v)))
        };
        let (min, max) = (to_usize(min)?, to_usize(capped)?);
        Ok(ValidatedBounds { bounds: LengthBounds { min, max }, clamped_from })
    }

    pub fn contains(&self, n: usize) -> bool {
        self.min <= n && n <= self.max
    }
}
