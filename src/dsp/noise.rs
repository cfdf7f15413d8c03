//! White noise, generated once and read through cheap views.

use std::sync::Arc;

use super::buffer::AudioBuffer;
use super::context::AudioContext;
use crate::rng::Rng;

/// Mono buffer of `length` frames, uniform in `[-1, 1]`.
pub fn white_noise(ctx: &AudioContext, length: usize, rng: &mut Rng) -> AudioBuffer {
    let data = (0..length).map(|_| rng.rand_bipolar() as f32).collect();
    AudioBuffer::from_mono(data, ctx.sample_rate)
}

/// Read-only cursor into a shared noise buffer.
///
/// Starts at an arbitrary offset and wraps at the end, so many hits can
/// share one buffer without sounding identical. Never writes to the buffer.
#[derive(Debug, Clone)]
pub struct NoiseView {
    source: Arc<AudioBuffer>,
    position: usize,
}

impl NoiseView {
    pub fn new(source: Arc<AudioBuffer>, offset: usize) -> Self {
        let len = source.frames().max(1);
        NoiseView {
            source,
            position: offset % len,
        }
    }

    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        let data = self.source.channel(0);
        if data.is_empty() {
            return 0.0;
        }
        let s = data[self.position];
        self.position += 1;
        if self.position >= data.len() {
            self.position = 0;
        }
        s as f64
    }

    pub fn position(&self) -> usize {
        self.position
    }
}
