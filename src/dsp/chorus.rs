//! Chorus: two modulated delay voices per channel summed against the dry signal.
//!
//! The voices sit at 25 ms and 30 ms and are swept by sine LFOs running at
//! `rate` and `rate * 1.1`. The right channel's LFOs start a quarter cycle
//! ahead for stereo width.

use super::context::AudioContext;
use super::delay_line::DelayLine;
use super::effect::{Effect, EffectKind, MIX, ParamSpec, blend, lookup};
use super::oscillator::{Oscillator, sine_osc};
use crate::error::Result;

const VOICE_DELAYS: [f64; 2] = [0.025, 0.030];
const VOICE_RATE_RATIO: [f64; 2] = [1.0, 1.1];
const MAX_DELAY_SECONDS: f64 = 0.05;

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("rate", 0.1, 10.0, 1.5),
    ParamSpec::new("depth", 0.0, 0.01, 0.002),
    ParamSpec { default: 0.5, ..MIX },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChorusParams {
    /// LFO rate in Hz.
    pub rate: f64,
    /// Sweep depth in seconds.
    pub depth: f64,
    pub mix: f64,
}

impl Default for ChorusParams {
    fn default() -> Self {
        ChorusParams {
            rate: 1.5,
            depth: 0.002,
            mix: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
struct ChorusChannel {
    line: DelayLine,
    lfos: [Oscillator; 2],
}

impl ChorusChannel {
    fn new(ctx: &AudioContext, rate: f64, phase: f64) -> Self {
        ChorusChannel {
            line: DelayLine::for_seconds(ctx.sample_rate, MAX_DELAY_SECONDS),
            lfos: [
                sine_osc(ctx, rate * VOICE_RATE_RATIO[0], phase),
                sine_osc(ctx, rate * VOICE_RATE_RATIO[1], phase),
            ],
        }
    }

    fn set_rate(&mut self, rate: f64) {
        for (lfo, ratio) in self.lfos.iter_mut().zip(VOICE_RATE_RATIO) {
            lfo.frequency = rate * ratio;
        }
    }

    #[inline]
    fn process(&mut self, input: f32, depth: f64, sample_rate: f64) -> f32 {
        self.line.push(input);
        let mut wet = 0.0;
        for (lfo, base) in self.lfos.iter_mut().zip(VOICE_DELAYS) {
            let delay = (base + depth * lfo.next_sample()) * sample_rate;
            // +1: read(1) is the sample just pushed, i.e. zero delay.
            wet += self.line.read_interpolated(delay + 1.0);
        }
        wet
    }
}

#[derive(Debug, Clone)]
pub struct Chorus {
    pub rate: f64,
    pub depth: f64,
    pub mix: f64,
    sample_rate: f64,
    left: ChorusChannel,
    right: ChorusChannel,
}

impl Chorus {
    pub fn new(ctx: &AudioContext) -> Self {
        Self::build(ctx, ChorusParams::default())
    }

    pub fn with_params(ctx: &AudioContext, params: ChorusParams) -> Result<Self> {
        PARAMS[0].check(params.rate)?;
        PARAMS[1].check(params.depth)?;
        PARAMS[2].check(params.mix)?;
        Ok(Self::build(ctx, params))
    }

    fn build(ctx: &AudioContext, p: ChorusParams) -> Self {
        Chorus {
            rate: p.rate,
            depth: p.depth,
            mix: p.mix,
            sample_rate: ctx.sample_rate,
            left: ChorusChannel::new(ctx, p.rate, 0.0),
            right: ChorusChannel::new(ctx, p.rate, 0.25),
        }
    }
}

impl Effect for Chorus {
    fn kind(&self) -> EffectKind {
        EffectKind::Chorus
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        let value = lookup(PARAMS, self.kind(), name)?.clamp(value);
        match name {
            "rate" => {
                self.rate = value;
                self.left.set_rate(value);
                self.right.set_rate(value);
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
        let mix = self.mix as f32;
        let wet_l = self.left.process(left, self.depth, self.sample_rate);
        let wet_r = self.right.process(right, self.depth, self.sample_rate);
        (blend(left, wet_l, mix), blend(right, wet_r, mix))
    }

    fn reset(&mut self) {
        for (ch, phase) in [(&mut self.left, 0.0), (&mut self.right, 0.25)] {
            ch.line.clear();
            for lfo in &mut ch.lfos {
                lfo.set_phase(phase);
            }
        }
    }
}
