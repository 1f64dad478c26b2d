//! Interpretation output types.
//!
//! The interpretation service returns paired arrays of glosses and
//! confidence scores (the upstream wire shape). The engine normalizes that
//! into an [`InterpretedResult`] with per-unit confidences, an aggregate
//! score, and a checksum of the raw output for later verification.

use serde::{Deserialize, Serialize};

use super::{hash256_hex, Hash256};

/// Raw output from the interpretation service, before normalization.
///
/// `glosses` and `confidences` are parallel arrays; they must be the same
/// length and every confidence must lie in `[0, 1]`. The engine rejects
/// anything else as malformed upstream output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInterpretation {
    /// Recognized sign glosses, in temporal order
    pub glosses: Vec<String>,

    /// Per-gloss confidence scores, parallel to `glosses`
    pub confidences: Vec<f64>,

    /// Duration of the analyzed media, in seconds
    pub media_duration_secs: f64,

    /// Number of frames the service analyzed
    pub frame_count: u32,

    /// Upstream processing time in milliseconds
    pub processing_ms: u64,
}

impl RawInterpretation {
    /// Check structural validity of the upstream output.
    ///
    /// Returns a description of the first violation found, suitable for a
    /// malformed-output failure reason.
    pub fn validate(&self) -> Result<(), String> {
        if self.glosses.is_empty() {
            return Err("interpretation returned no recognized units".to_string());
        }
        if self.glosses.len() != self.confidences.len() {
            return Err(format!(
                "unit/confidence count mismatch: {} units, {} confidences",
                self.glosses.len(),
                self.confidences.len()
            ));
        }
        for (i, c) in self.confidences.iter().enumerate() {
            if !c.is_finite() || *c < 0.0 || *c > 1.0 {
                return Err(format!("confidence[{}] out of range: {}", i, c));
            }
        }
        Ok(())
    }
}

/// A single recognized semantic unit with its confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedUnit {
    /// The recognized gloss (short label for the sign)
    pub gloss: String,

    /// Recognition confidence in `[0, 1]`
    pub confidence: f64,
}

/// Normalized, structured interpretation of a media recording.
///
/// Owned exclusively by the session that produced it; a result is never
/// shared across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretedResult {
    /// Recognized units in temporal order
    pub units: Vec<RecognizedUnit>,

    /// Mean confidence across all units
    pub aggregate_confidence: f64,

    /// Duration of the analyzed media, in seconds
    pub media_duration_secs: f64,

    /// Number of frames analyzed
    pub frame_count: u32,

    /// Upstream processing time in milliseconds
    pub processing_ms: u64,

    /// Checksum of the raw upstream output this result was derived from
    #[serde(with = "hash256_hex")]
    pub raw_output_checksum: Hash256,
}

impl InterpretedResult {
    /// Build a normalized result from validated raw output.
    ///
    /// The caller is expected to have run [`RawInterpretation::validate`]
    /// first; the checksum should cover the untouched raw output.
    pub fn from_raw(raw: &RawInterpretation, raw_output_checksum: Hash256) -> Self {
        let units: Vec<RecognizedUnit> = raw
            .glosses
            .iter()
            .zip(raw.confidences.iter())
            .map(|(gloss, confidence)| RecognizedUnit {
                gloss: gloss.clone(),
                confidence: *confidence,
            })
            .collect();

        let aggregate_confidence = if units.is_empty() {
            0.0
        } else {
            units.iter().map(|u| u.confidence).sum::<f64>() / units.len() as f64
        };

        Self {
            units,
            aggregate_confidence,
            media_duration_secs: raw.media_duration_secs,
            frame_count: raw.frame_count,
            processing_ms: raw.processing_ms,
            raw_output_checksum,
        }
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Glosses in order, for display and form mapping.
    pub fn glosses(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.gloss.as_str()).collect()
    }
}
