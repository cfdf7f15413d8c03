//! Waveshaping distortion: drive, a fixed soft-clip curve, tone lowpass, level.

use std::f64::consts::PI;

use super::context::AudioContext;
use super::effect::{Effect, EffectKind, MIX, ParamSpec, blend, lookup};
use super::filter::{BiquadFilter, FilterType};
use crate::error::Result;

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("amount", 0.0, 100.0, 50.0),
    ParamSpec::new("drive", 0.1, 10.0, 1.0),
    ParamSpec::new("tone", 500.0, 10000.0, 5000.0),
    ParamSpec::new("level", 0.0, 1.0, 0.5),
    MIX,
];

/// `(3 + k) * x * 20° / (π + k * |x|)` for `x` in `[-1, 1]`. Odd and monotonic.
#[inline]
pub fn shape(x: f64, amount: f64) -> f64 {
    let x = x.clamp(-1.0, 1.0);
    let deg = PI / 180.0;
    (3.0 + amount) * x * 20.0 * deg / (PI + amount * x.abs())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionParams {
    pub amount: f64,
    pub drive: f64,
    pub tone: f64,
    pub level: f64,
    pub mix: f64,
}

impl Default for DistortionParams {
    fn default() -> Self {
        DistortionParams {
            amount: PARAMS[0].default,
            drive: PARAMS[1].default,
            tone: PARAMS[2].default,
            level: PARAMS[3].default,
            mix: PARAMS[4].default,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Distortion {
    pub amount: f64,
    pub drive: f64,
    pub tone: f64,
    pub level: f64,
    pub mix: f64,
    tone_l: BiquadFilter,
    tone_r: BiquadFilter,
}

impl Distortion {
    pub fn new(ctx: &AudioContext) -> Self {
        Self::build(ctx, DistortionParams::default())
    }

    pub fn with_params(ctx: &AudioContext, params: DistortionParams) -> Result<Self> {
        PARAMS[0].check(params.amount)?;
        PARAMS[1].check(params.drive)?;
        PARAMS[2].check(params.tone)?;
        PARAMS[3].check(params.level)?;
        PARAMS[4].check(params.mix)?;
        Ok(Self::build(ctx, params))
    }

    fn build(ctx: &AudioContext, p: DistortionParams) -> Self {
        let q = std::f64::consts::FRAC_1_SQRT_2;
        Distortion {
            amount: p.amount,
            drive: p.drive,
            tone: p.tone,
            level: p.level,
            mix: p.mix,
            tone_l: BiquadFilter::with_params(FilterType::Lowpass, ctx, p.tone, q, 0.0),
            tone_r: BiquadFilter::with_params(FilterType::Lowpass, ctx, p.tone, q, 0.0),
        }
    }
}

#[inline]
fn drive_channel(filter: &mut BiquadFilter, x: f32, drive: f64, amount: f64, level: f64) -> f32 {
    let shaped = shape(x as f64 * drive, amount);
    (filter.process(shaped) * level) as f32
}

impl Effect for Distortion {
    fn kind(&self) -> EffectKind {
        EffectKind::Distortion
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        let value = lookup(PARAMS, self.kind(), name)?.clamp(value);
        match name {
            "amount" => self.amount = value,
            "drive" => self.drive = value,
            "tone" => {
                self.tone = value;
                self.tone_l.set_frequency(value);
                self.tone_r.set_frequency(value);
            }
            "level" => self.level = value,
            "mix" => self.mix = value,
            _ => {}
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Option<f64> {
        match name {
            "amount" => Some(self.amount),
            "drive" => Some(self.drive),
            "tone" => Some(self.tone),
            "level" => Some(self.level),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let (drive, amount, level) = (self.drive, self.amount, self.level);
        let wet_l = drive_channel(&mut self.tone_l, left, drive, amount, level);
        let wet_r = drive_channel(&mut self.tone_r, right, drive, amount, level);
        let mix = self.mix as f32;
        (blend(left, wet_l, mix), blend(right, wet_r, mix))
    }

    fn reset(&mut self) {
        self.tone_l.reset();
        self.tone_r.reset();
    }
}
