//! Three-band EQ: low shelf at 320 Hz, peaking mid, high shelf at 3.2 kHz.

use super::context::AudioContext;
use super::effect::{Effect, EffectKind, MIX, ParamSpec, blend, lookup};
use super::filter::{BiquadFilter, FilterType};
use crate::error::Result;

pub const LOW_SHELF_HZ: f64 = 320.0;
pub const HIGH_SHELF_HZ: f64 = 3200.0;
const MID_Q: f64 = 1.0;
const SHELF_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("low", -12.0, 12.0, 0.0),
    ParamSpec::new("mid", -12.0, 12.0, 0.0),
    ParamSpec::new("high", -12.0, 12.0, 0.0),
    ParamSpec::new("mid_freq", 200.0, 8000.0, 1000.0),
    MIX,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqParams {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
    pub mid_freq: f64,
    pub mix: f64,
}

impl Default for EqParams {
    fn default() -> Self {
        EqParams {
            low: 0.0,
            mid: 0.0,
            high: 0.0,
            mid_freq: PARAMS[3].default,
            mix: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Bands {
    low: BiquadFilter,
    mid: BiquadFilter,
    high: BiquadFilter,
}

impl Bands {
    fn new(ctx: &AudioContext, p: &EqParams) -> Self {
        Bands {
            low: BiquadFilter::with_params(FilterType::Lowshelf, ctx, LOW_SHELF_HZ, SHELF_Q, p.low),
            mid: BiquadFilter::with_params(FilterType::Peaking, ctx, p.mid_freq, MID_Q, p.mid),
            high: BiquadFilter::with_params(FilterType::Highshelf, ctx, HIGH_SHELF_HZ, SHELF_Q, p.high),
        }
    }

    #[inline]
    fn process(&mut self, x: f32) -> f32 {
        let y = self.low.process(x as f64);
        let y = self.mid.process(y);
        self.high.process(y) as f32
    }

    fn reset(&mut self) {
        self.low.reset();
        self.mid.reset();
        self.high.reset();
    }
}

#[derive(Debug, Clone)]
pub struct Eq {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
    pub mid_freq: f64,
    pub mix: f64,
    left: Bands,
    right: Bands,
}

impl Eq {
    pub fn new(ctx: &AudioContext) -> Self {
        Self::build(ctx, EqParams::default())
    }

    pub fn with_params(ctx: &AudioContext, params: EqParams) -> Result<Self> {
        for (spec, value) in PARAMS
            .iter()
            .zip([params.low, params.mid, params.high, params.mid_freq, params.mix])
        {
            spec.check(value)?;
        }
        Ok(Self::build(ctx, params))
    }

    fn build(ctx: &AudioContext, p: EqParams) -> Self {
        Eq {
            low: p.low,
            mid: p.mid,
            high: p.high,
            mid_freq: p.mid_freq,
            mix: p.mix,
            left: Bands::new(ctx, &p),
            right: Bands::new(ctx, &p),
        }
    }
}

impl Effect for Eq {
    fn kind(&self) -> EffectKind {
        EffectKind::Eq
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        let value = lookup(PARAMS, self.kind(), name)?.clamp(value);
        match name {
            "low" => {
                self.low = value;
                self.left.low.set_gain_db(value);
                self.right.low.set_gain_db(value);
            }
            "mid" => {
                self.mid = value;
                self.left.mid.set_gain_db(value);
                self.right.mid.set_gain_db(value);
            }
            "high" => {
                self.high = value;
                self.left.high.set_gain_db(value);
                self.right.high.set_gain_db(value);
            }
            "mid_freq" => {
                self.mid_freq = value;
                self.left.mid.set_frequency(value);
                self.right.mid.set_frequency(value);
            }
            "mix" => self.mix = value,
            _ => {}
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Option<f64> {
        match name {
            "low" => Some(self.low),
            "mid" => Some(self.mid),
            "high" => Some(self.high),
            "mid_freq" => Some(self.mid_freq),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let mix = self.mix as f32;
        let wet_l = self.left.process(left);
        let wet_r = self.right.process(right);
        (blend(left, wet_l, mix), blend(right, wet_r, mix))
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}
