//! Biquad and one-pole filters.
//!
//! Biquad coefficients follow the Audio EQ Cookbook (Robert Bristow-Johnson)
//! the same way WebAudio's BiquadFilterNode does, with shelf slope S = 1.

use std::f64::consts::PI;

use super::context::AudioContext;

/// Filter response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Lowshelf,
    Highshelf,
    Peaking,
    Allpass,
}

/// A biquad IIR filter (2nd order), Direct Form II Transposed.
///
/// Parameters are public; setters mark the coefficients dirty and they are
/// recomputed lazily on the next `process` call.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,
    /// Only used by the shelf and peaking responses.
    pub gain_db: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: 0.707,
            gain_db: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    pub fn with_params(filter_type: FilterType, ctx: &AudioContext, frequency: f64, q: f64, gain_db: f64) -> Self {
        let mut f = BiquadFilter::new(filter_type, ctx.sample_rate);
        f.frequency = frequency;
        f.q = q;
        f.gain_db = gain_db;
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let nyquist = self.sample_rate / 2.0;
        let freq = self.frequency.clamp(1.0, nyquist * 0.999);
        let q = self.q.max(1e-4);
        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);
        let a_lin = 10.0_f64.powf(self.gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::Bandpass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha),
            FilterType::Notch => (1.0, -2.0 * cos_w0, 1.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha),
            FilterType::Allpass => (
                1.0 - alpha,
                -2.0 * cos_w0,
                1.0 + alpha,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterType::Peaking => (
                1.0 + alpha * a_lin,
                -2.0 * cos_w0,
                1.0 - alpha * a_lin,
                1.0 + alpha / a_lin,
                -2.0 * cos_w0,
                1.0 - alpha / a_lin,
            ),
            FilterType::Lowshelf | FilterType::Highshelf => {
                // Slope S = 1 gives alpha = sin(w0)/2 * sqrt(2).
                let shelf_alpha = sin_w0 / 2.0 * 2.0_f64.sqrt();
                let two_sqrt_a_alpha = 2.0 * a_lin.sqrt() * shelf_alpha;
                let (ap1, am1) = (a_lin + 1.0, a_lin - 1.0);
                if self.filter_type == FilterType::Lowshelf {
                    (
                        a_lin * (ap1 - am1 * cos_w0 + two_sqrt_a_alpha),
                        2.0 * a_lin * (am1 - ap1 * cos_w0),
                        a_lin * (ap1 - am1 * cos_w0 - two_sqrt_a_alpha),
                        ap1 + am1 * cos_w0 + two_sqrt_a_alpha,
                        -2.0 * (am1 + ap1 * cos_w0),
                        ap1 + am1 * cos_w0 - two_sqrt_a_alpha,
                    )
                } else {
                    (
                        a_lin * (ap1 + am1 * cos_w0 + two_sqrt_a_alpha),
                        -2.0 * a_lin * (am1 + ap1 * cos_w0),
                        a_lin * (ap1 + am1 * cos_w0 - two_sqrt_a_alpha),
                        ap1 - am1 * cos_w0 + two_sqrt_a_alpha,
                        2.0 * (am1 - ap1 * cos_w0),
                        ap1 - am1 * cos_w0 - two_sqrt_a_alpha,
                    )
                }
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    pub fn set_frequency(&mut self, freq: f64) {
        self.frequency = freq;
        self.dirty = true;
    }

    pub fn set_q(&mut self, q: f64) {
        self.q = q;
        self.dirty = true;
    }

    pub fn set_gain_db(&mut self, gain_db: f64) {
        self.gain_db = gain_db;
        self.dirty = true;
    }
}

/// Single-pole low-pass smoother: `y += a * (x - y)`.
#[derive(Debug, Clone)]
pub struct OnePole {
    a: f64,
    y: f64,
    sample_rate: f64,
}

impl OnePole {
    pub fn new(sample_rate: f64, cutoff: f64) -> Self {
        let mut f = OnePole { a: 1.0, y: 0.0, sample_rate };
        f.set_cutoff(cutoff);
        f
    }

    pub fn set_cutoff(&mut self, cutoff: f64) {
        let fc = cutoff.clamp(1.0, self.sample_rate / 2.0);
        self.a = 1.0 - (-2.0 * PI * fc / self.sample_rate).exp();
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        self.y += self.a * (input - self.y);
        self.y
    }

    pub fn reset(&mut self) {
        self.y = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(f: &mut BiquadFilter, input: f64) -> f64 {
        let mut output = 0.0;
        for _ in 0..5000 {
            output = f.process(input);
        }
        output
    }

    /// Peak output amplitude for a sine at `freq` after the transient.
    fn sine_gain(f: &mut BiquadFilter, freq: f64) -> f64 {
        let mut max_out = 0.0_f64;
        for i in 0..8820 {
            let t = i as f64 / 44100.0;
            let out = f.process((2.0 * PI * freq * t).sin());
            if i > 4410 {
                max_out = max_out.max(out.abs());
            }
        }
        max_out
    }

    fn ctx() -> AudioContext {
        AudioContext::new(44100.0, 128)
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut f = BiquadFilter::with_params(FilterType::Lowpass, &ctx(), 5000.0, 0.707, 0.0);
        let output = settle(&mut f, 1.0);
        assert!((output - 1.0).abs() < 0.001, "Lowpass should pass DC, got {output}");
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut f = BiquadFilter::with_params(FilterType::Highpass, &ctx(), 1000.0, 0.707, 0.0);
        let output = settle(&mut f, 1.0);
        assert!(output.abs() < 0.001, "Highpass should block DC, got {output}");
    }

    #[test]
    fn lowpass_attenuates_high_freq() {
        let mut f = BiquadFilter::with_params(FilterType::Lowpass, &ctx(), 200.0, 0.707, 0.0);
        let amp = sine_gain(&mut f, 10000.0);
        assert!(amp < 0.01, "Lowpass@200Hz should strongly attenuate 10kHz, got amplitude {amp}");
    }

    #[test]
    fn lowshelf_boosts_dc_by_gain() {
        let mut f = BiquadFilter::with_params(FilterType::Lowshelf, &ctx(), 320.0, 0.707, 12.0);
        let output = settle(&mut f, 1.0);
        let expected = 10.0_f64.powf(12.0 / 20.0);
        assert!((output - expected).abs() < 0.01, "Lowshelf +12dB DC gain {output}, expected {expected}");
    }

    #[test]
    fn highshelf_leaves_dc_alone() {
        let mut f = BiquadFilter::with_params(FilterType::Highshelf, &ctx(), 3200.0, 0.707, -12.0);
        let output = settle(&mut f, 1.0);
        assert!((output - 1.0).abs() < 0.001, "Highshelf should not touch DC, got {output}");
    }

    #[test]
    fn peaking_boosts_center() {
        let mut f = BiquadFilter::with_params(FilterType::Peaking, &ctx(), 1000.0, 1.0, 6.0);
        let amp = sine_gain(&mut f, 1000.0);
        let expected = 10.0_f64.powf(6.0 / 20.0);
        assert!((amp - expected).abs() < 0.05, "Peaking +6dB at center gave {amp}");
    }

    #[test]
    fn allpass_keeps_magnitude() {
        let mut f = BiquadFilter::with_params(FilterType::Allpass, &ctx(), 1000.0, 5.0, 0.0);
        for freq in [200.0, 1000.0, 5000.0] {
            f.reset();
            let amp = sine_gain(&mut f, freq);
            assert!((amp - 1.0).abs() < 0.02, "Allpass changed magnitude at {freq}Hz: {amp}");
        }
    }

    #[test]
    fn filter_output_finite() {
        let mut f = BiquadFilter::with_params(FilterType::Bandpass, &ctx(), 1000.0, 5.0, 0.0);
        for i in 0..10000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite(), "Filter output not finite at sample {i}");
        }
    }

    #[test]
    fn setters_mark_dirty() {
        let mut f = BiquadFilter::with_params(FilterType::Lowpass, &ctx(), 200.0, 0.707, 0.0);
        f.set_frequency(20000.0);
        let amp = sine_gain(&mut f, 1000.0);
        assert!(amp > 0.95, "Raised cutoff should pass 1kHz, got {amp}");
    }

    #[test]
    fn one_pole_converges() {
        let mut lp = OnePole::new(44100.0, 3000.0);
        let mut y = 0.0;
        for _ in 0..1000 {
            y = lp.process(1.0);
        }
        assert!((y - 1.0).abs() < 1e-6);
    }
}
