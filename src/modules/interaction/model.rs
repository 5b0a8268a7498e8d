use serde::Serialize;

use crate::constants::{DEFAULT_MAX_SCORE, DEFAULT_SCORE_DELTA};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreConfig {
    pub delta: f64,
    pub cap: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self { delta: DEFAULT_SCORE_DELTA, cap: DEFAULT_MAX_SCORE }
    }
}

/// Both mirrored entries after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairScore {
    pub forward: f64,
    pub backward: f64,
}

/// One side of the capped increment. The cache script applies the same rule.
pub fn capped_increment(current: Option<f64>, delta: f64, cap: f64) -> f64 {
    let current = current.unwrap_or(0.0);
    if current >= cap {
        return current;
    }
    (current + delta).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_entry_starts_from_zero() {
        assert_eq!(capped_increment(None, 0.5, 10.0), 0.5);
    }

    #[test]
    fn increment_never_overshoots_cap() {
        assert_eq!(capped_increment(Some(9.75), 0.5, 10.0), 10.0);
    }

    #[test]
    fn entry_at_or_above_cap_is_untouched() {
        assert_eq!(capped_increment(Some(10.0), 0.5, 10.0), 10.0);
        // rows written before a cap was lowered are never decreased
        assert_eq!(capped_increment(Some(12.0), 0.5, 10.0), 12.0);
    }
}
