//! Tremolo: sine amplitude modulation, `gain = 1 + depth * lfo`.

use super::context::AudioContext;
use super::effect::{Effect, EffectKind, MIX, ParamSpec, blend, lookup};
use super::oscillator::{Oscillator, sine_osc};
use crate::error::Result;

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("rate", 0.1, 20.0, 5.0),
    ParamSpec::new("depth", 0.0, 1.0, 0.5),
    MIX,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TremoloParams {
    pub rate: f64,
    pub depth: f64,
    pub mix: f64,
}

impl Default for TremoloParams {
    fn default() -> Self {
        TremoloParams {
            rate: 5.0,
            depth: 0.5,
            mix: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tremolo {
    pub rate: f64,
    pub depth: f64,
    pub mix: f64,
    lfo: Oscillator,
}

impl Tremolo {
    pub fn new(ctx: &AudioContext) -> Self {
        Self::build(ctx, TremoloParams::default())
    }

    pub fn with_params(ctx: &AudioContext, params: TremoloParams) -> Result<Self> {
        PARAMS[0].check(params.rate)?;
        PARAMS[1].check(params.depth)?;
        PARAMS[2].check(params.mix)?;
        Ok(Self::build(ctx, params))
    }

    fn build(ctx: &AudioContext, p: TremoloParams) -> Self {
        Tremolo {
            rate: p.rate,
            depth: p.depth,
            mix: p.mix,
            lfo: sine_osc(ctx, p.rate, 0.0),
        }
    }
}

impl Effect for Tremolo {
    fn kind(&self) -> EffectKind {
        EffectKind::Tremolo
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        let value = lookup(PARAMS, self.kind(), name)?.clamp(value);
        match name {
            "rate" => {
                self.rate = value;
                self.lfo.frequency = value;
            }
            "depth" => self.depth = value,
            "mix" => self.mix = value,
            _ => {}
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Option<f64> {
        match name {
            "rate" => Some(self.rate),
            "depth" => Some(self.depth),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let gain = (1.0 + self.depth * self.lfo.next_sample()) as f32;
        let mix = self.mix as f32;
        (blend(left, left * gain, mix), blend(right, right * gain, mix))
    }

    fn reset(&mut self) {
        self.lfo.reset();
    }
}
