//! Echo: stereo feedback delay with a one-pole "tone" lowpass in the loop.

use super::context::AudioContext;
use super::delay_line::DelayLine;
use super::effect::{Effect, EffectKind, MIX, ParamSpec, blend, lookup};
use super::filter::OnePole;
use crate::error::Result;

/// Longest supported delay time in seconds.
pub const MAX_DELAY_SECONDS: f64 = 5.0;

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("time", 0.001, MAX_DELAY_SECONDS, 0.3),
    ParamSpec::new("feedback", 0.0, 0.95, 0.4),
    ParamSpec::new("tone", 500.0, 12000.0, 3000.0),
    ParamSpec { default: 0.3, ..MIX },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoParams {
    pub time: f64,
    pub feedback: f64,
    pub tone: f64,
    pub mix: f64,
}

impl Default for EchoParams {
    fn default() -> Self {
        EchoParams {
            time: PARAMS[0].default,
            feedback: PARAMS[1].default,
            tone: PARAMS[2].default,
            mix: PARAMS[3].default,
        }
    }
}

#[derive(Debug, Clone)]
struct EchoChannel {
    line: DelayLine,
    tone: OnePole,
}

impl EchoChannel {
    fn new(ctx: &AudioContext, tone: f64) -> Self {
        EchoChannel {
            line: DelayLine::for_seconds(ctx.sample_rate, MAX_DELAY_SECONDS),
            tone: OnePole::new(ctx.sample_rate, tone),
        }
    }

    /// Returns the filtered delayed (wet) sample.
    #[inline]
    fn process(&mut self, input: f32, delay_frames: f64, feedback: f32) -> f32 {
        let delayed = self.line.read_interpolated(delay_frames);
        let filtered = self.tone.process(delayed as f64) as f32;
        self.line.push(input + filtered * feedback);
        filtered
    }
}

/// Stereo echo. Feedback is capped below 1 so repeats always die out.
#[derive(Debug, Clone)]
pub struct Echo {
    pub time: f64,
    pub feedback: f64,
    pub tone: f64,
    pub mix: f64,
    sample_rate: f64,
    left: EchoChannel,
    right: EchoChannel,
}

impl Echo {
    pub fn new(ctx: &AudioContext) -> Self {
        Self::build(ctx, EchoParams::default())
    }

    pub fn with_params(ctx: &AudioContext, params: EchoParams) -> Result<Self> {
        PARAMS[0].check(params.time)?;
        PARAMS[1].check(params.feedback)?;
        PARAMS[2].check(params.tone)?;
        PARAMS[3].check(params.mix)?;
        Ok(Self::build(ctx, params))
    }

    fn build(ctx: &AudioContext, params: EchoParams) -> Self {
        Echo {
            time: params.time,
            feedback: params.feedback,
            tone: params.tone,
            mix: params.mix,
            sample_rate: ctx.sample_rate,
            left: EchoChannel::new(ctx, params.tone),
            right: EchoChannel::new(ctx, params.tone),
        }
    }
}

impl Effect for Echo {
    fn kind(&self) -> EffectKind {
        EffectKind::Echo
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        let value = lookup(PARAMS, self.kind(), name)?.clamp(value);
        match name {
            "time" => self.time = value,
            "feedback" => self.feedback = value,
            "tone" => {
                self.tone = value;
                self.left.tone.set_cutoff(value);
                self.right.tone.set_cutoff(value);
            }
            "mix" => self.mix = value,
            _ => {}
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Option<f64> {
        match name {
            "time" => Some(self.time),
            "feedback" => Some(self.feedback),
            "tone" => Some(self.tone),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let frames = self.time * self.sample_rate;
        let fb = self.feedback as f32;
        let mix = self.mix as f32;
        let wet_l = self.left.process(left, frames, fb);
        let wet_r = self.right.process(right, frames, fb);
        (blend(left, wet_l, mix), blend(right, wet_r, mix))
    }

    fn reset(&mut self) {
        for ch in [&mut self.left, &mut self.right] {
            ch.line.clear();
            ch.tone.reset();
        }
    }
}
