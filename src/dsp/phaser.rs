//! Phaser: a cascade of LFO-swept allpass stages with feedback.

use super::context::AudioContext;
use super::effect::{Effect, EffectKind, MIX, ParamSpec, blend, lookup};
use super::filter::{BiquadFilter, FilterType};
use super::oscillator::{Oscillator, sine_osc};
use crate::error::Result;

pub const MAX_STAGES: usize = 12;
const BASE_FREQ: f64 = 1000.0;
const STAGE_SPACING: f64 = 500.0;
const STAGE_Q: f64 = 5.0;
/// Frames between allpass coefficient updates.
const MOD_INTERVAL: u32 = 16;

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("rate", 0.1, 5.0, 0.5),
    ParamSpec::new("depth", 100.0, 1000.0, 500.0),
    ParamSpec::new("feedback", 0.0, 0.95, 0.7),
    ParamSpec::new("stages", 1.0, MAX_STAGES as f64, 4.0),
    ParamSpec { default: 0.5, ..MIX },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaserParams {
    pub rate: f64,
    /// Sweep in Hz around each stage's centre.
    pub depth: f64,
    pub feedback: f64,
    pub stages: usize,
    pub mix: f64,
}

impl Default for PhaserParams {
    fn default() -> Self {
        PhaserParams {
            rate: 0.5,
            depth: 500.0,
            feedback: 0.7,
            stages: 4,
            mix: 0.5,
        }
    }
}

fn stage_center(index: usize) -> f64 {
    BASE_FREQ + STAGE_SPACING * index as f64
}

#[derive(Debug, Clone)]
struct PhaserChannel {
    filters: [BiquadFilter; MAX_STAGES],
    last: f64,
}

impl PhaserChannel {
    fn new(ctx: &AudioContext) -> Self {
        PhaserChannel {
            filters: std::array::from_fn(|i| {
                BiquadFilter::with_params(FilterType::Allpass, ctx, stage_center(i), STAGE_Q, 0.0)
            }),
            last: 0.0,
        }
    }

    fn sweep(&mut self, offset: f64, stages: usize) {
        for (i, filter) in self.filters.iter_mut().take(stages).enumerate() {
            filter.set_frequency(stage_center(i) + offset);
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f64, stages: usize) -> f32 {
        let mut y = input as f64 + self.last * feedback;
        for filter in self.filters.iter_mut().take(stages) {
            y = filter.process(y);
        }
        self.last = y;
        y as f32
    }

    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
        self.last = 0.0;
    }
}

#[derive(Debug, Clone)]
pub struct Phaser {
    pub rate: f64,
    pub depth: f64,
    pub feedback: f64,
    pub stages: usize,
    pub mix: f64,
    lfo: Oscillator,
    countdown: u32,
    left: PhaserChannel,
    right: PhaserChannel,
}

impl Phaser {
    pub fn new(ctx: &AudioContext) -> Self {
        Self::build(ctx, PhaserParams::default())
    }

    pub fn with_params(ctx: &AudioContext, params: PhaserParams) -> Result<Self> {
        PARAMS[0].check(params.rate)?;
        PARAMS[1].check(params.depth)?;
        PARAMS[2].check(params.feedback)?;
        PARAMS[3].check(params.stages as f64)?;
        PARAMS[4].check(params.mix)?;
        Ok(Self::build(ctx, params))
    }

    fn build(ctx: &AudioContext, p: PhaserParams) -> Self {
        Phaser {
            rate: p.rate,
            depth: p.depth,
            feedback: p.feedback,
            stages: p.stages,
            mix: p.mix,
            lfo: sine_osc(ctx, p.rate, 0.0),
            countdown: 0,
            left: PhaserChannel::new(ctx),
            right: PhaserChannel::new(ctx),
        }
    }
}

impl Effect for Phaser {
    fn kind(&self) -> EffectKind {
        EffectKind::Phaser
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
            "feedback" => self.feedback = value,
            "stages" => self.stages = value.round() as usize,
            "mix" => self.mix = value,
            _ => {}
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Option<f64> {
        match name {
            "rate" => Some(self.rate),
            "depth" => Some(self.depth),
            "feedback" => Some(self.feedback),
            "stages" => Some(self.stages as f64),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let lfo = self.lfo.next_sample();
        if self.countdown == 0 {
            let offset = self.depth * lfo;
            self.left.sweep(offset, self.stages);
            self.right.sweep(offset, self.stages);
            self.countdown = MOD_INTERVAL;
        }
        self.countdown -= 1;

        let mix = self.mix as f32;
        let wet_l = self.left.process(left, self.feedback, self.stages);
        let wet_r = self.right.process(right, self.feedback, self.stages);
        (blend(left, wet_l, mix), blend(right, wet_r, mix))
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.lfo.reset();
        self.countdown = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AudioContext {
        AudioContext::new(44100.0, 128)
    }

    #[test]
    fn wet_path_without_feedback_preserves_energy() {
        let mut fx = Phaser::with_params(
            &ctx(),
            PhaserParams {
                feedback: 0.0,
                mix: 1.0,
                ..PhaserParams::default()
            },
        )
        .unwrap();
        let mut in_energy = 0.0_f64;
        let mut out_energy = 0.0_f64;
        for i in 0..44100 {
            let x = (i as f32 * 0.07).sin() * 0.5;
            let (l, _) = fx.process_frame(x, x);
            if i > 4410 {
                in_energy += (x as f64).powi(2);
                out_energy += (l as f64).powi(2);
            }
        }
        let ratio = out_energy / in_energy;
        assert!((ratio - 1.0).abs() < 0.1, "allpass cascade energy ratio {ratio}");
    }

    #[test]
    fn half_mix_creates_notches() {
        // Dry + allpass at 50/50 cancels where the cascade is 180 degrees out.
        let mut fx = Phaser::new(&ctx());
        fx.set_parameter("feedback", 0.0).unwrap();
        fx.set_parameter("depth", 100.0).unwrap();
        let mut min_rms = f64::MAX;
        let mut max_rms = 0.0_f64;
        for freq in [300.0, 800.0, 1500.0, 2500.0, 4000.0, 8000.0] {
            fx.reset();
            let mut acc = 0.0;
            for i in 0..8820 {
                let x = (2.0 * std::f64::consts::PI * freq * i as f64 / 44100.0).sin() as f32;
                let (l, _) = fx.process_frame(x, x);
                if i > 4410 {
                    acc += (l as f64).powi(2);
                }
            }
            let rms = (acc / 4409.0).sqrt();
            min_rms = min_rms.min(rms);
            max_rms = max_rms.max(rms);
        }
        assert!(max_rms > min_rms * 2.0, "expected a notched response, rms {min_rms}..{max_rms}");
    }

    #[test]
    fn stages_round_and_clamp() {
        let mut fx = Phaser::new(&ctx());
        fx.set_parameter("stages", 7.6).unwrap();
        assert_eq!(fx.stages, 8);
        fx.set_parameter("stages", 40.0).unwrap();
        assert_eq!(fx.stages, MAX_STAGES);
    }

    #[test]
    fn high_feedback_stays_stable() {
        let mut fx = Phaser::new(&ctx());
        fx.set_parameter("feedback", 0.95).unwrap();
        let mut peak = 0.0_f32;
        for i in 0..44100 {
            let x = if i % 1000 == 0 { 1.0 } else { 0.0 };
            peak = peak.max(fx.process_frame(x, x).0.abs());
        }
        assert!(peak.is_finite() && peak < 20.0, "peak {peak}");
    }
}
