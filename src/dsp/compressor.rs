//! Feed-forward compressor with a soft knee above the threshold.
//!
//! The detector is a stereo-linked peak follower with separate attack and
//! release coefficients. The static curve leaves signals at or below the
//! threshold untouched, eases in over `knee` dB above it, then applies the
//! full ratio.

use super::context::AudioContext;
use super::effect::{Effect, EffectKind, MIX, ParamSpec, blend, lookup};
use crate::error::Result;

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("threshold", -100.0, 0.0, -24.0),
    ParamSpec::new("knee", 0.0, 40.0, 30.0),
    ParamSpec::new("ratio", 1.0, 20.0, 12.0),
    ParamSpec::new("attack", 0.0, 1.0, 0.003),
    ParamSpec::new("release", 0.0, 1.0, 0.25),
    ParamSpec::new("makeup", 0.0, 24.0, 3.5),
    MIX,
];

#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 1e-6 { -120.0 } else { 20.0 * linear.log10() }
}

#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// One-pole smoothing coefficient; zero time means follow instantly.
fn time_coef(seconds: f64, sample_rate: f64) -> f64 {
    let frames = seconds * sample_rate;
    if frames < 1.0 { 0.0 } else { (-1.0 / frames).exp() }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorParams {
    pub threshold: f64,
    pub knee: f64,
    pub ratio: f64,
    pub attack: f64,
    pub release: f64,
    /// Makeup gain in dB.
    pub makeup: f64,
    pub mix: f64,
}

impl Default for CompressorParams {
    fn default() -> Self {
        CompressorParams {
            threshold: -24.0,
            knee: 30.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
            makeup: 3.5,
            mix: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Compressor {
    pub threshold: f64,
    pub knee: f64,
    pub ratio: f64,
    pub attack: f64,
    pub release: f64,
    pub makeup: f64,
    pub mix: f64,
    sample_rate: f64,
    attack_coef: f64,
    release_coef: f64,
    envelope: f64,
}

impl Compressor {
    pub fn new(ctx: &AudioContext) -> Self {
        Self::build(ctx, CompressorParams::default())
    }

    pub fn with_params(ctx: &AudioContext, params: CompressorParams) -> Result<Self> {
        let values = [
            params.threshold,
            params.knee,
            params.ratio,
            params.attack,
            params.release,
            params.makeup,
            params.mix,
        ];
        for (spec, value) in PARAMS.iter().zip(values) {
            spec.check(value)?;
        }
        Ok(Self::build(ctx, params))
    }

    fn build(ctx: &AudioContext, p: CompressorParams) -> Self {
        Compressor {
            threshold: p.threshold,
            knee: p.knee,
            ratio: p.ratio,
            attack: p.attack,
            release: p.release,
            makeup: p.makeup,
            mix: p.mix,
            sample_rate: ctx.sample_rate,
            attack_coef: time_coef(p.attack, ctx.sample_rate),
            release_coef: time_coef(p.release, ctx.sample_rate),
            envelope: 0.0,
        }
    }

    /// Static gain reduction in dB (>= 0) for an input level in dB.
    pub fn gain_reduction_db(&self, input_db: f64) -> f64 {
        let over = input_db - self.threshold;
        if over <= 0.0 {
            return 0.0;
        }
        let slope = 1.0 - 1.0 / self.ratio;
        if over < self.knee {
            slope * over * over / (2.0 * self.knee)
        } else {
            slope * (over - self.knee / 2.0)
        }
    }

    /// Reduction currently applied by the detector, in dB.
    pub fn current_reduction_db(&self) -> f64 {
        self.gain_reduction_db(linear_to_db(self.envelope))
    }
}

impl Effect for Compressor {
    fn kind(&self) -> EffectKind {
        EffectKind::Compressor
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        let value = lookup(PARAMS, self.kind(), name)?.clamp(value);
        match name {
            "threshold" => self.threshold = value,
            "knee" => self.knee = value,
            "ratio" => self.ratio = value,
            "attack" => {
                self.attack = value;
                self.attack_coef = time_coef(value, self.sample_rate);
            }
            "release" => {
                self.release = value;
                self.release_coef = time_coef(value, self.sample_rate);
            }
            "makeup" => self.makeup = value,
            "mix" => self.mix = value,
            _ => {}
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Option<f64> {
        match name {
            "threshold" => Some(self.threshold),
            "knee" => Some(self.knee),
            "ratio" => Some(self.ratio),
            "attack" => Some(self.attack),
            "release" => Some(self.release),
            "makeup" => Some(self.makeup),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let level = left.abs().max(right.abs()) as f64;
        let coef = if level > self.envelope { self.attack_coef } else { self.release_coef };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;

        let gain = db_to_linear(self.makeup - self.current_reduction_db()) as f32;
        let mix = self.mix as f32;
        (blend(left, left * gain, mix), blend(right, right * gain, mix))
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AudioContext {
        AudioContext::new(44100.0, 128)
    }

    #[test]
    fn no_reduction_at_or_below_threshold() {
        let comp = Compressor::new(&ctx());
        assert_eq!(comp.gain_reduction_db(-60.0), 0.0);
        assert_eq!(comp.gain_reduction_db(-24.0), 0.0);
    }

    #[test]
    fn reduction_rises_monotonically_above_threshold() {
        let comp = Compressor::new(&ctx());
        let mut prev = 0.0;
        for step in 1..=400 {
            let input = -24.0 + step as f64 * 0.1;
            let gr = comp.gain_reduction_db(input);
            assert!(gr > prev, "reduction must grow at {input} dB");
            prev = gr;
        }
    }

    #[test]
    fn hard_knee_applies_full_ratio() {
        let params = CompressorParams {
            threshold: -20.0,
            knee: 0.0,
            ratio: 4.0,
            ..CompressorParams::default()
        };
        let comp = Compressor::with_params(&ctx(), params).unwrap();
        // 20 dB over at 4:1 leaves 5 dB over: 15 dB of reduction.
        assert!((comp.gain_reduction_db(0.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn knee_joins_the_ratio_line_continuously() {
        let comp = Compressor::new(&ctx());
        let edge = comp.threshold + comp.knee;
        let below = comp.gain_reduction_db(edge - 1e-9);
        let above = comp.gain_reduction_db(edge + 1e-9);
        assert!((below - above).abs() < 1e-6);
    }

    #[test]
    fn loud_signal_is_turned_down() {
        let params = CompressorParams {
            makeup: 0.0,
            ..CompressorParams::default()
        };
        let mut comp = Compressor::with_params(&ctx(), params).unwrap();
        let mut peak = 0.0_f32;
        for i in 0..44100 {
            let x = (i as f32 * 0.1).sin() * 0.9;
            let y = comp.process_frame(x, x).0;
            if i > 39690 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak > 0.1 && peak < 0.6, "compressed peak {peak}");
        assert!(comp.current_reduction_db() > 3.0);
    }

    #[test]
    fn quiet_signal_gets_makeup_only() {
        let mut comp = Compressor::new(&ctx());
        let x = 0.01_f32; // -40 dB
        let mut y = 0.0;
        for _ in 0..4410 {
            y = comp.process_frame(x, x).0;
        }
        let expected = x * db_to_linear(3.5) as f32;
        assert!((y - expected).abs() < 1e-4, "got {y}, expected {expected}");
    }

    #[test]
    fn zero_attack_follows_instantly() {
        let mut comp = Compressor::new(&ctx());
        comp.set_parameter("attack", 0.0).unwrap();
        comp.set_parameter("makeup", 0.0).unwrap();
        let (y, _) = comp.process_frame(1.0, 1.0);
        let expected = db_to_linear(-comp.gain_reduction_db(0.0)) as f32;
        assert!((y - expected).abs() < 1e-6);
    }
}
