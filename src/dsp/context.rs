//! Explicit rendering context handed to every synthesizer and effect.

/// Sample rate and block size shared by everything that renders audio.
///
/// Constructors take this instead of reaching for any global state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioContext {
    pub sample_rate: f64,
    pub block_size: usize,
}

impl AudioContext {
    pub fn new(sample_rate: f64, block_size: usize) -> Self {
        AudioContext {
            sample_rate,
            block_size: block_size.max(1),
        }
    }

    /// Seconds to a whole number of frames (rounded down).
    #[inline]
    pub fn frames(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate) as usize
    }

    #[inline]
    pub fn seconds(&self, frames: u64) -> f64 {
        frames as f64 / self.sample_rate
    }
}

impl Default for AudioContext {
    fn default() -> Self {
        AudioContext::new(44100.0, 128)
    }
}
