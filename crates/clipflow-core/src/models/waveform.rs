use serde::{Deserialize, Serialize};

/// Amplitude used for every point when the source is silent or too short
/// to window.
pub const FLAT_AMPLITUDE: f32 = 0.5;

/// Fixed-length sequence of normalized amplitudes (0.0–1.0) for one audio
/// track, used for visualization. Length is fixed by configuration
/// regardless of source duration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaveformSample {
    pub points: Vec<f32>,
}

impl WaveformSample {
    pub fn new(points: Vec<f32>) -> Self {
        Self { points }
    }

    /// The default sequence for silent or near-zero-length sources.
    pub fn flat(len: usize) -> Self {
        Self {
            points: vec![FLAT_AMPLITUDE; len],
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_flat(&self) -> bool {
        self.points
            .iter()
            .all(|p| (p - FLAT_AMPLITUDE).abs() < f32::EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_sequence_has_requested_length() {
        let wf = WaveformSample::flat(20);
        assert_eq!(wf.len(), 20);
        assert!(wf.is_flat());
        assert!(wf.points.iter().all(|p| (*p - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn non_flat_detected() {
        let wf = WaveformSample::new(vec![0.1, 0.9, 0.5]);
        assert!(!wf.is_flat());
    }
}
