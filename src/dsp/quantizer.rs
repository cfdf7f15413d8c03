//! "Autotune-lite": amplitude quantisation with a short feedback delay.
//!
//! This is a character effect, not pitch correction. Each sample is snapped
//! to `round(x * steps) / steps`, smeared by a 5 ms feedback delay, and
//! blended with the dry signal by `strength`.

use super::context::AudioContext;
use super::delay_line::DelayLine;
use super::effect::{Effect, EffectKind, ParamSpec, blend, lookup};
use crate::error::Result;

const SMEAR_SECONDS: f64 = 0.005;
const SMEAR_FEEDBACK: f32 = 0.25;

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("strength", 0.0, 1.0, 0.5),
    ParamSpec::new("steps", 1.0, 64.0, 8.0),
];

/// Snap `x` (clamped to `[-1, 1]`) onto a grid of `steps` levels per unit.
#[inline]
pub fn quantize(x: f32, steps: f32) -> f32 {
    (x.clamp(-1.0, 1.0) * steps).round() / steps
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizerParams {
    pub strength: f64,
    pub steps: f64,
}

impl Default for QuantizerParams {
    fn default() -> Self {
        QuantizerParams {
            strength: 0.5,
            steps: 8.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Quantizer {
    pub strength: f64,
    pub steps: f64,
    smear_frames: usize,
    left: DelayLine,
    right: DelayLine,
}

impl Quantizer {
    pub fn new(ctx: &AudioContext) -> Self {
        Self::build(ctx, QuantizerParams::default())
    }

    pub fn with_params(ctx: &AudioContext, params: QuantizerParams) -> Result<Self> {
        PARAMS[0].check(params.strength)?;
        PARAMS[1].check(params.steps)?;
        Ok(Self::build(ctx, params))
    }

    fn build(ctx: &AudioContext, p: QuantizerParams) -> Self {
        let smear_frames = ctx.frames(SMEAR_SECONDS).max(1);
        Quantizer {
            strength: p.strength,
            steps: p.steps,
            smear_frames,
            left: DelayLine::new(smear_frames),
            right: DelayLine::new(smear_frames),
        }
    }
}

#[inline]
fn smear(line: &mut DelayLine, frames: usize, q: f32) -> f32 {
    let y = q + line.read(frames) * SMEAR_FEEDBACK;
    line.push(y);
    y
}

impl Effect for Quantizer {
    fn kind(&self) -> EffectKind {
        EffectKind::Quantizer
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        let value = lookup(PARAMS, self.kind(), name)?.clamp(value);
        match name {
            "strength" => self.strength = value,
            "steps" => self.steps = value,
            _ => {}
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Option<f64> {
        match name {
            "strength" => Some(self.strength),
            "steps" => Some(self.steps),
            _ => None,
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let steps = self.steps as f32;
        let strength = self.strength as f32;
        let wet_l = smear(&mut self.left, self.smear_frames, quantize(left, steps));
        let wet_r = smear(&mut self.right, self.smear_frames, quantize(right, steps));
        (blend(left, wet_l, strength), blend(right, wet_r, strength))
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_snaps_to_grid() {
        assert_eq!(quantize(0.3, 4.0), 0.25);
        assert_eq!(quantize(0.4, 4.0), 0.5);
        assert_eq!(quantize(-0.3, 4.0), -0.25);
        assert_eq!(quantize(3.0, 4.0), 1.0);
        assert_eq!(quantize(0.4, 1.0), 0.0);
    }

    #[test]
    fn zero_strength_is_dry() {
        let ctx = AudioContext::new(44100.0, 128);
        let mut fx = Quantizer::new(&ctx);
        fx.set_parameter("strength", 0.0).unwrap();
        for i in 0..1000 {
            let x = (i as f32 * 0.01).sin() * 0.7;
            let (l, r) = fx.process_frame(x, -x);
            assert_eq!(l, x);
            assert_eq!(r, -x);
        }
    }

    #[test]
    fn full_strength_is_stepped_before_the_smear_returns() {
        let ctx = AudioContext::new(44100.0, 128);
        let mut fx = Quantizer::with_params(
            &ctx,
            QuantizerParams {
                strength: 1.0,
                steps: 4.0,
            },
        )
        .unwrap();
        // The smear delay is 220 frames; before it comes back, output is the grid value.
        for i in 0..200 {
            let x = i as f32 / 200.0;
            let (l, _) = fx.process_frame(x, x);
            assert_eq!(l, quantize(x, 4.0), "frame {i}");
        }
    }

    #[test]
    fn smear_feeds_back() {
        let ctx = AudioContext::new(44100.0, 128);
        let mut fx = Quantizer::with_params(
            &ctx,
            QuantizerParams {
                strength: 1.0,
                steps: 8.0,
            },
        )
        .unwrap();
        fx.process_frame(1.0, 1.0);
        let mut out = Vec::new();
        for _ in 0..500 {
            out.push(fx.process_frame(0.0, 0.0).0);
        }
        // Echo of the first frame after 220 frames, scaled by the feedback.
        assert!((out[219] - SMEAR_FEEDBACK).abs() < 1e-6, "got {}", out[219]);
        assert!((out[439] - SMEAR_FEEDBACK * SMEAR_FEEDBACK).abs() < 1e-6);
    }
}
