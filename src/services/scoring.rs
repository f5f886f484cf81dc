//! Step-function scoring of timed answers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Points awarded to a correct answer given within `max_elapsed_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreTier {
    /// Inclusive upper bound on elapsed seconds.
    pub max_elapsed_secs: f64,
    /// Points for a correct answer within the bound.
    pub points: u32,
}

/// Reasons a tier table is refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringPolicyError {
    /// Threshold is NaN, infinite or negative.
    #[error("tier {index} has a non-finite or negative threshold")]
    InvalidThreshold {
        /// Offending tier.
        index: usize,
    },
    /// Thresholds are not strictly ascending.
    #[error("tier {index} threshold does not increase over the previous tier")]
    UnorderedThreshold {
        /// Offending tier.
        index: usize,
    },
    /// A slower tier pays more than a faster one.
    #[error("tier {index} awards more points than a faster tier")]
    IncreasingPoints {
        /// Offending tier.
        index: usize,
    },
    /// Slow answers would earn more than the slowest tier.
    #[error("fallback points exceed the slowest tier")]
    FallbackTooHigh,
}

/// Maps (correctness, elapsed seconds) to points.
///
/// Incorrect answers always score zero and points never increase as elapsed
/// time grows; both are enforced by [`ScoringPolicy::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    tiers: Vec<ScoreTier>,
    fallback_points: u32,
}

impl ScoringPolicy {
    /// Validate `tiers` (ascending thresholds, non-increasing points) and the fallback.
    pub fn new(tiers: Vec<ScoreTier>, fallback_points: u32) -> Result<Self, ScoringPolicyError> {
        let mut previous: Option<ScoreTier> = None;
        for (index, tier) in tiers.iter().enumerate() {
            if !tier.max_elapsed_secs.is_finite() || tier.max_elapsed_secs < 0.0 {
                return Err(ScoringPolicyError::InvalidThreshold { index });
            }
            if let Some(previous) = previous {
                if tier.max_elapsed_secs <= previous.max_elapsed_secs {
                    return Err(ScoringPolicyError::UnorderedThreshold { index });
                }
                if tier.points > previous.points {
                    return Err(ScoringPolicyError::IncreasingPoints { index });
                }
            }
            previous = Some(*tier);
        }
        if previous.is_some_and(|slowest| fallback_points > slowest.points) {
            return Err(ScoringPolicyError::FallbackTooHigh);
        }

        Ok(Self {
            tiers,
            fallback_points,
        })
    }

    /// Points for one answer; zero when incorrect.
    pub fn score(&self, is_correct: bool, elapsed_secs: f64) -> u32 {
        if !is_correct {
            return 0;
        }
        self.tiers
            .iter()
            .find(|tier| elapsed_secs <= tier.max_elapsed_secs)
            .map_or(self.fallback_points, |tier| tier.points)
    }

    /// Tiers in ascending threshold order.
    pub fn tiers(&self) -> &[ScoreTier] {
        &self.tiers
    }

    /// Points for correct answers slower than every tier.
    pub fn fallback_points(&self) -> u32 {
        self.fallback_points
    }
}

impl Default for ScoringPolicy {
    /// 100 points up to 5s, 75 up to 10s, 50 up to 15s, 25 afterwards.
    fn default() -> Self {
        Self {
            tiers: vec![
                ScoreTier {
                    max_elapsed_secs: 5.0,
                    points: 100,
                },
                ScoreTier {
                    max_elapsed_secs: 10.0,
                    points: 75,
                },
                ScoreTier {
                    max_elapsed_secs: 15.0,
                    points: 50,
                },
            ],
            fallback_points: 25,
        }
    }
}
