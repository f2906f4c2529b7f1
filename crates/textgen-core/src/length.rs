use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use textgen_common::TextgenError;

use crate::bounds::LengthBounds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    #[default]
    Words,
    Tokens,
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LengthUnit::Words => "words",
            LengthUnit::Tokens => "tokens",
        })
    }
}

impl FromStr for LengthUnit {
    type Err = TextgenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "words" | "word" => Ok(LengthUnit::Words),
            "tokens" | "token" => Ok(LengthUnit::Tokens),
            other => Err(TextgenError::InvalidArgument(format!("unknown length unit '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LengthCheck {
    pub count: usize,
    pub unit: LengthUnit,
    pub bounds: LengthBounds,
    pub within: bool,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn check_count(count: usize, unit: LengthUnit, bounds: LengthBounds) -> LengthCheck {
    LengthCheck { count, unit, bounds, within: bounds.contains(count) }
}

pub fn check_words(text: &str, bounds: LengthBounds) -> LengthCheck {
    check_count(word_count(text), LengthUnit::Words, bounds)
}
