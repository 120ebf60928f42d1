//! Tone classification from loudness.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete mood label derived from loudness at utterance finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Calm,
    Mysterious,
    Dramatic,
    Excited,
}

impl Tone {
    /// Classify a normalized loudness sample.
    ///
    /// Total over all f32 input: values above 1.0 are excited, negatives and
    /// NaN fall through to calm. Deterministic, no state.
    pub fn from_loudness(loudness: f32) -> Self {
        if loudness > 0.8 {
            Tone::Excited
        } else if loudness > 0.6 {
            Tone::Dramatic
        } else if loudness > 0.3 {
            Tone::Mysterious
        } else {
            Tone::Calm
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Calm => "calm",
            Tone::Mysterious => "mysterious",
            Tone::Dramatic => "dramatic",
            Tone::Excited => "excited",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
