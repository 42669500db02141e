pub mod parser;

pub use parser::{parse, parse_dynamic, parse_static};

use serde::{Deserialize, Serialize};

/// Score a static report falls back to when no line matches its pattern.
pub const STATIC_DEFAULT_SCORE: f64 = 100.0;

/// Largest magnitude a parsed score may have; anything beyond is treated as garbage.
pub const MAX_SCORE_MAGNITUDE: f64 = 1.0e12;

// ============================================================================
// Data model
// ============================================================================

/// The four positional captures of a dynamic-test summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicCounts {
    pub errors: u64,
    pub failures: u64,
    pub skips: u64,
    pub tests: u64,
}

impl DynamicCounts {
    /// Errors plus failures; `None` when the sum does not fit.
    pub fn problems(&self) -> Option<u64> {
        self.errors.checked_add(self.failures)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParseResult {
    Dynamic {
        score: f64,
        passed: bool,
        counts: DynamicCounts,
    },
    Static {
        score: f64,
        /// False when no line matched and the score is the 100.0 default.
        matched: bool,
    },
}

impl ParseResult {
    pub fn score(&self) -> f64 {
        match self {
            ParseResult::Dynamic { score, .. } | ParseResult::Static { score, .. } => *score,
        }
    }

    /// Pass/fail only exists for dynamic tests.
    pub fn passed(&self) -> Option<bool> {
        match self {
            ParseResult::Dynamic { passed, .. } => Some(*passed),
            ParseResult::Static { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Reject static reports where nothing matched instead of scoring 100.0.
    pub strict_static: bool,
}
