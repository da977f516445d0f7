//! Engine configuration: classification thresholds and count intervals.
//!
//! Both are policy knobs, not hard-coded logic; the defaults follow the
//! usual ABC practice (80/95 cutoffs, class A counted most often).

use chrono::Days;
use serde::{Deserialize, Serialize};

use fleetforge_parts::AbcClass;

use crate::error::EngineError;

/// Cumulative-value percentage cutoffs for ABC classification.
///
/// Walking the parts sorted by usage value descending, a part is class `A`
/// while the cumulative share of total value stays at or under
/// `a_cutoff_pct`, class `B` up to `b_cutoff_pct`, class `C` beyond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbcThresholds {
    pub a_cutoff_pct: u8,
    pub b_cutoff_pct: u8,
}

impl AbcThresholds {
    pub fn new(a_cutoff_pct: u8, b_cutoff_pct: u8) -> Result<Self, EngineError> {
        if a_cutoff_pct == 0 {
            return Err(EngineError::Validation(
                "class A cutoff must be positive".to_string(),
            ));
        }
        if a_cutoff_pct >= b_cutoff_pct {
            return Err(EngineError::Validation(
                "class A cutoff must be below the class B cutoff".to_string(),
            ));
        }
        if b_cutoff_pct > 100 {
            return Err(EngineError::Validation(
                "class B cutoff cannot exceed 100 percent".to_string(),
            ));
        }
        Ok(Self {
            a_cutoff_pct,
            b_cutoff_pct,
        })
    }
}

impl Default for AbcThresholds {
    fn default() -> Self {
        Self {
            a_cutoff_pct: 80,
            b_cutoff_pct: 95,
        }
    }
}

/// Days between cycle counts, per ABC class.
///
/// Unclassified parts (never seen by the classifier yet) count on the
/// class C cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountIntervals {
    pub class_a_days: u64,
    pub class_b_days: u64,
    pub class_c_days: u64,
    pub unclassified_days: u64,
}

impl CountIntervals {
    pub fn interval_for(&self, class: Option<AbcClass>) -> Days {
        let days = match class {
            Some(AbcClass::A) => self.class_a_days,
            Some(AbcClass::B) => self.class_b_days,
            Some(AbcClass::C) => self.class_c_days,
            None => self.unclassified_days,
        };
        Days::new(days)
    }
}

impl Default for CountIntervals {
    fn default() -> Self {
        Self {
            class_a_days: 30,
            class_b_days: 90,
            class_c_days: 180,
            unclassified_days: 180,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub thresholds: AbcThresholds,
    pub intervals: CountIntervals,
}
