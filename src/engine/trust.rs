//! Trust scoring over interpreted results.
//!
//! The aggregate confidence of an interpretation feeds a trust score in
//! [0,1]. Scores below the review threshold flag the session for human
//! review; the flag is advisory and never blocks proof issuance.

use crate::domain::InterpretedResult;
use crate::infra::{EngineError, Result};

/// Review threshold applied when none is configured
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.75;

/// Outcome of scoring one interpreted result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustAssessment {
    pub score: f64,
    pub requires_human_review: bool,
}

/// Policy mapping interpretation confidence to a trust decision.
#[derive(Debug, Clone, Copy)]
pub struct TrustPolicy {
    review_threshold: f64,
}

impl TrustPolicy {
    pub fn new(review_threshold: f64) -> Result<Self> {
        if !review_threshold.is_finite() || !(0.0..=1.0).contains(&review_threshold) {
            return Err(EngineError::Configuration(format!(
                "review threshold must be in [0,1], got {}",
                review_threshold
            )));
        }
        Ok(Self { review_threshold })
    }

    pub fn review_threshold(&self) -> f64 {
        self.review_threshold
    }

    pub fn evaluate(&self, result: &InterpretedResult) -> TrustAssessment {
        let score = result.aggregate_confidence.clamp(0.0, 1.0);
        TrustAssessment {
            score,
            requires_human_review: score < self.review_threshold,
        }
    }
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawInterpretation;

    fn result_with_confidences(confidences: Vec<f64>) -> InterpretedResult {
        let raw = RawInterpretation {
            glosses: confidences.iter().map(|_| "unit".to_string()).collect(),
            confidences,
            media_duration_secs: 1.0,
            frame_count: 30,
            processing_ms: 100,
        };
        InterpretedResult::from_raw(&raw, [0u8; 32])
    }

    #[test]
    fn test_high_confidence_passes_without_review() {
        let policy = TrustPolicy::default();
        let assessment = policy.evaluate(&result_with_confidences(vec![0.95, 0.87, 0.92]));
        assert!((assessment.score - 0.9133333333333333).abs() < 1e-12);
        assert!(!assessment.requires_human_review);
    }

    #[test]
    fn test_low_confidence_flags_review() {
        let policy = TrustPolicy::default();
        let assessment = policy.evaluate(&result_with_confidences(vec![0.6, 0.7]));
        assert!(assessment.requires_human_review);
    }

    #[test]
    fn test_threshold_is_exclusive_at_boundary() {
        let policy = TrustPolicy::new(0.75).unwrap();
        let at_threshold = policy.evaluate(&result_with_confidences(vec![0.75]));
        assert!(!at_threshold.requires_human_review);
        let below = policy.evaluate(&result_with_confidences(vec![0.7499]));
        assert!(below.requires_human_review);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        assert!(TrustPolicy::new(-0.1).is_err());
        assert!(TrustPolicy::new(1.1).is_err());
        assert!(TrustPolicy::new(f64::NAN).is_err());
        assert!(TrustPolicy::new(0.0).is_ok());
        assert!(TrustPolicy::new(1.0).is_ok());
    }
}
