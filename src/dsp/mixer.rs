//! Mixer: stereo summing bus with equal-power panning, master gain and a
//! tanh soft clip on the way out.

use std::f32::consts::FRAC_PI_4;

/// Equal-power gains for `pan` in [-1, 1]; centre is -3 dB per side.
#[inline]
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let theta = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (theta.cos(), theta.sin())
}

#[inline]
pub fn soft_clip(x: f32) -> f32 {
    x.tanh()
}

/// Pre-sized stereo accumulator. `clear` never grows past the capacity
/// given at construction.
#[derive(Debug, Clone)]
pub struct Mixer {
    pub master_gain: f32,
    left: Vec<f32>,
    right: Vec<f32>,
    frames: usize,
}

impl Mixer {
    pub fn new(capacity: usize, master_gain: f32) -> Self {
        let capacity = capacity.max(1);
        Mixer {
            master_gain,
            left: vec![0.0; capacity],
            right: vec![0.0; capacity],
            frames: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.left.len()
    }

    /// Zero the first `frames` frames (clamped to capacity) and make them current.
    pub fn clear(&mut self, frames: usize) {
        self.frames = frames.min(self.left.len());
        self.left[..self.frames].fill(0.0);
        self.right[..self.frames].fill(0.0);
    }

    pub fn len(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Accumulate a frame at `index`, applying `gain` and `pan`.
    #[inline]
    pub fn add(&mut self, index: usize, frame: (f32, f32), gain: f32, pan: f32) {
        if index >= self.frames {
            return;
        }
        let (gl, gr) = pan_gains(pan);
        self.left[index] += frame.0 * gain * gl;
        self.right[index] += frame.1 * gain * gr;
    }

    /// Current bus contents, for in-place effects.
    pub fn bus_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.left[..self.frames], &mut self.right[..self.frames])
    }

    /// Write master gain and soft clip into the output slices.
    pub fn write_output(&self, out_left: &mut [f32], out_right: &mut [f32]) {
        let n = self.frames.min(out_left.len()).min(out_right.len());
        for i in 0..n {
            out_left[i] = soft_clip(self.left[i] * self.master_gain);
            out_right[i] = soft_clip(self.right[i] * self.master_gain);
        }
    }
}
