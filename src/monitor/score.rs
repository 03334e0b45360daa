//! Accumulate-and-decay scoring of loudness samples.
//!
//! Every sample adds `100 - |lufs|` to the score. Crossing the threshold fires
//! and resets; otherwise the score decays geometrically, so brief bursts fade
//! while sustained noise builds up.

/// Outcome of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Hold,
    Fire,
}

/// Score contributed by a single loudness sample.
pub fn loudness_delta(lufs: f64) -> f64 {
    100.0 - lufs.abs()
}

#[derive(Debug, Clone)]
pub struct ScoreEngine {
    score: f64,
    threshold: f64,
    decay: f64,
}

impl ScoreEngine {
    pub fn new(threshold: f64, decay: f64) -> Self {
        Self {
            score: 0.0,
            threshold,
            decay,
        }
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    /// Fold one loudness sample into the score.
    pub fn observe(&mut self, lufs: f64) -> Decision {
        // Clamp at zero: a silent stretch must not bank negative credit.
        self.score = (self.score + loudness_delta(lufs)).max(0.0);
        if self.score > self.threshold {
            self.score = 0.0;
            Decision::Fire
        } else {
            self.score *= self.decay;
            Decision::Hold
        }
    }

    pub fn reset(&mut self) {
        self.score = 0.0;
    }
}
