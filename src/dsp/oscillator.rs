//! Anti-aliased oscillators using PolyBLEP.

use std::f64::consts::PI;

use super::context::AudioContext;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// A band-limited oscillator with anti-aliasing (PolyBLEP).
///
/// Phase is normalized to `[0, 1)`. Every waveform is 0 at phase 0 and
/// rising, except the square which starts high.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f64,
    pub detune: f64, // in cents
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            frequency: 440.0,
            detune: 0.0,
            phase: 0.0,
            sample_rate,
        }
    }

    /// Oscillator at `frequency` starting from `phase` (in cycles).
    pub fn with_phase(waveform: Waveform, ctx: &AudioContext, frequency: f64, phase: f64) -> Self {
        let mut osc = Oscillator::new(waveform, ctx.sample_rate);
        osc.frequency = frequency;
        osc.phase = phase.rem_euclid(1.0);
        osc
    }

    /// Effective frequency accounting for detune (in cents).
    fn effective_freq(&self) -> f64 {
        self.frequency * (2.0_f64).powf(self.detune / 1200.0)
    }

    /// Phase increment per sample.
    fn phase_inc(&self) -> f64 {
        (self.effective_freq() / self.sample_rate).min(0.5)
    }

    /// Generate the next sample.
    pub fn next_sample(&mut self) -> f64 {
        let inc = self.phase_inc();
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Sawtooth => self.sawtooth(inc),
            Waveform::Square => self.square(inc),
            Waveform::Triangle => 4.0 * ((self.phase - 0.25).rem_euclid(1.0) - 0.5).abs() - 1.0,
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

    /// Rises from -1 to +1 starting at 0 (phase shifted by half a cycle).
    fn sawtooth(&self, inc: f64) -> f64 {
        let t = (self.phase + 0.5) % 1.0;
        let naive = 2.0 * t - 1.0;
        naive - poly_blep(t, inc)
    }

    fn square(&self, inc: f64) -> f64 {
        let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase + 0.5) % 1.0, inc);
        value
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Reset oscillator phase.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    pub fn set_phase(&mut self, phase: f64) {
        self.phase = phase.rem_euclid(1.0);
    }
}

pub fn sine_osc(ctx: &AudioContext, frequency: f64, phase: f64) -> Oscillator {
    Oscillator::with_phase(Waveform::Sine, ctx, frequency, phase)
}

pub fn saw_osc(ctx: &AudioContext, frequency: f64, phase: f64) -> Oscillator {
    Oscillator::with_phase(Waveform::Sawtooth, ctx, frequency, phase)
}

pub fn square_osc(ctx: &AudioContext, frequency: f64, phase: f64) -> Oscillator {
    Oscillator::with_phase(Waveform::Square, ctx, frequency, phase)
}

pub fn triangle_osc(ctx: &AudioContext, frequency: f64, phase: f64) -> Oscillator {
    Oscillator::with_phase(Waveform::Triangle, ctx, frequency, phase)
}

/// PolyBLEP (Polynomial Band-Limited Step) anti-aliasing correction.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AudioContext {
        AudioContext::new(44100.0, 128)
    }

    #[test]
    fn sine_zero_at_start() {
        let mut osc = sine_osc(&ctx(), 440.0, 0.0);
        let sample = osc.next_sample();
        assert!(sample.abs() < 1e-10, "Sine should start near 0, got {sample}");
    }

    #[test]
    fn sine_phase_offset() {
        let mut osc = sine_osc(&ctx(), 440.0, 0.25);
        let sample = osc.next_sample();
        assert!((sample - 1.0).abs() < 1e-10, "Quarter-cycle phase should start at 1, got {sample}");
    }

    #[test]
    fn triangle_starts_at_zero_and_peaks() {
        let mut osc = triangle_osc(&ctx(), 441.0, 0.0);
        let first = osc.next_sample();
        assert!(first.abs() < 1e-10, "Triangle should start at 0, got {first}");
        let peak = (0..200).map(|_| osc.next_sample()).fold(0.0_f64, f64::max);
        assert!(peak > 0.99 && peak <= 1.0, "Triangle peak {peak}");
    }

    #[test]
    fn waveforms_stay_bounded() {
        for make in [saw_osc, square_osc, triangle_osc, sine_osc] {
            let mut osc = make(&ctx(), 440.0, 0.0);
            for _ in 0..44100 {
                let s = osc.next_sample();
                assert!((-1.5..=1.5).contains(&s), "{:?} out of range: {s}", osc.waveform);
            }
        }
    }

    #[test]
    fn detune_shifts_frequency() {
        let mut osc1 = sine_osc(&ctx(), 440.0, 0.0);
        osc1.detune = 0.0;
        let mut osc2 = sine_osc(&ctx(), 440.0, 0.0);
        osc2.detune = 1200.0;

        let inc1 = osc1.phase_inc();
        let inc2 = osc2.phase_inc();
        assert!(
            (inc2 - 2.0 * inc1).abs() < 1e-10,
            "1200 cents detune should double frequency"
        );
    }
}
