//! Envelope shapers.
//!
//! [`Envelope`] is a fixed breakpoint curve used for one-shot sounds
//! (drum layers, blips, pitch sweeps). [`Adsr`] is a gated envelope for
//! sustained notes whose release time is not known in advance.

use super::buffer::AudioBuffer;
use crate::error::{Result, SynthError};

/// Lowest level an exponential segment may reach. Exponential
/// interpolation toward 0 would need `ln(0)`.
pub const EXP_FLOOR: f64 = 1e-4;

/// Shape of the segment that ends at a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    /// Seconds from the start of the envelope.
    pub time: f64,
    pub level: f64,
    /// Curve used to reach `level` from the previous breakpoint.
    pub curve: Curve,
}

/// Ordered breakpoints with strictly increasing times, the first at `t = 0`.
///
/// Before the first breakpoint the envelope reads the first level; after
/// the last it holds the last level.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    points: Vec<Breakpoint>,
}

impl Envelope {
    /// Start an envelope at `level`; extend it with [`Envelope::linear_to`]
    /// and [`Envelope::exp_to`].
    pub fn starting_at(level: f64) -> Self {
        Envelope {
            points: vec![Breakpoint {
                time: 0.0,
                level,
                curve: Curve::Linear,
            }],
        }
    }

    /// Constant level forever.
    pub fn constant(level: f64) -> Self {
        Self::starting_at(level)
    }

    /// Exponential fall from `peak` to the floor over `decay` seconds.
    pub fn percussive(peak: f64, decay: f64) -> Self {
        Self::starting_at(peak).exp_to(EXP_FLOOR, decay)
    }

    /// Validate and wrap a list of breakpoints.
    pub fn from_breakpoints(points: Vec<Breakpoint>) -> Result<Self> {
        let Some(first) = points.first() else {
            return Err(SynthError::configuration("breakpoints", 0.0, "envelope needs at least one breakpoint"));
        };
        if first.time != 0.0 {
            return Err(SynthError::configuration("time", first.time, "first breakpoint must be at t = 0"));
        }
        for pair in points.windows(2) {
            if pair[1].time <= pair[0].time {
                return Err(SynthError::configuration(
                    "time",
                    pair[1].time,
                    "breakpoint times must be strictly increasing",
                ));
            }
        }
        if let Some(bad) = points.iter().find(|p| !p.level.is_finite()) {
            return Err(SynthError::configuration("level", bad.level, "levels must be finite"));
        }
        Ok(Envelope { points })
    }

    pub fn linear_to(self, level: f64, after: f64) -> Self {
        self.push(level, after, Curve::Linear)
    }

    pub fn exp_to(self, level: f64, after: f64) -> Self {
        self.push(level, after, Curve::Exponential)
    }

    /// Stay at the current level for `after` seconds.
    pub fn hold(self, after: f64) -> Self {
        let level = self.final_level();
        self.push(level, after, Curve::Linear)
    }

    fn push(mut self, level: f64, after: f64, curve: Curve) -> Self {
        // A zero-length step still has to move time forward.
        let time = self.end_time() + after.max(1e-6);
        self.points.push(Breakpoint { time, level, curve });
        self
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.points
    }

    pub fn end_time(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.time)
    }

    pub fn final_level(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.level)
    }

    /// Scale every level by `gain`.
    pub fn scaled(mut self, gain: f64) -> Self {
        for p in &mut self.points {
            p.level *= gain;
        }
        self
    }

    /// Level at `time` seconds.
    pub fn level_at(&self, time: f64) -> f64 {
        let idx = self.points.partition_point(|p| p.time <= time);
        self.segment_level(idx, time)
    }

    /// `segment` is the index of the breakpoint the segment ends on.
    fn segment_level(&self, segment: usize, time: f64) -> f64 {
        if segment == 0 {
            return self.points[0].level;
        }
        let Some(end) = self.points.get(segment) else {
            return self.final_level();
        };
        let start = &self.points[segment - 1];
        let u = ((time - start.time) / (end.time - start.time)).clamp(0.0, 1.0);
        match end.curve {
            Curve::Linear => start.level + (end.level - start.level) * u,
            Curve::Exponential => {
                let a = start.level.abs().max(EXP_FLOOR);
                let b = end.level.abs().max(EXP_FLOOR);
                let sign = if end.level < 0.0 { -1.0 } else { 1.0 };
                sign * a * (b / a).powf(u)
            }
        }
    }
}

/// Streaming reader over an [`Envelope`] at a fixed sample rate.
///
/// Holds only a segment index and a clock, so it can live inside a voice
/// while the envelope itself is shared.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCursor {
    frame: u64,
    sample_rate: f64,
    segment: usize,
}

impl EnvelopeCursor {
    pub fn new(sample_rate: f64) -> Self {
        EnvelopeCursor {
            frame: 0,
            sample_rate,
            segment: 0,
        }
    }

    /// Level for the current sample, then advance one sample.
    #[inline]
    pub fn next(&mut self, env: &Envelope) -> f64 {
        let time = self.time();
        let points = env.breakpoints();
        while self.segment < points.len() && points[self.segment].time <= time {
            self.segment += 1;
        }
        self.frame += 1;
        env.segment_level(self.segment, time)
    }

    pub fn is_finished(&self, env: &Envelope) -> bool {
        self.time() > env.end_time()
    }

    pub fn time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }
}

/// Multiply every channel of `buffer` by `env`, in place.
pub fn apply_envelope(buffer: &mut AudioBuffer, env: &Envelope) {
    let sample_rate = buffer.sample_rate();
    for channel in buffer.channels_mut() {
        let mut cursor = EnvelopeCursor::new(sample_rate);
        for s in channel.iter_mut() {
            *s *= cursor.next(env) as f32;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Gated ADSR with linear segments.
#[derive(Debug, Clone)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    /// Sustain level relative to the peak.
    pub sustain: f64,
    pub release: f64,

    stage: Stage,
    level: f64,
    /// Per-sample increment of the running segment.
    step: f64,
    sample_rate: f64,
}

impl Adsr {
    pub fn new(sample_rate: f64, attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Adsr {
            attack: attack.max(0.0),
            decay: decay.max(0.0),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(0.0),
            stage: Stage::Idle,
            level: 0.0,
            step: 0.0,
            sample_rate,
        }
    }

    /// Samples needed to cover `distance` in `seconds`, as a signed step.
    fn step_for(&self, distance: f64, seconds: f64) -> f64 {
        let samples = seconds * self.sample_rate;
        if samples < 1.0 { distance } else { distance / samples }
    }

    /// Note on. Retriggering ramps up from the current level.
    pub fn gate_on(&mut self) {
        self.stage = Stage::Attack;
        self.step = self.step_for(1.0 - self.level, self.attack);
    }

    /// Note off. Releases from wherever the envelope currently is.
    pub fn gate_off(&mut self) {
        if self.stage == Stage::Idle {
            return;
        }
        self.stage = Stage::Release;
        self.step = self.step_for(-self.level, self.release);
    }

    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => self.level = 0.0,
            Stage::Attack => {
                self.level += self.step;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                    self.step = self.step_for(self.sustain - 1.0, self.decay);
                }
            }
            Stage::Decay => {
                self.level += self.step;
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => self.level = self.sustain,
            Stage::Release => {
                self.level += self.step;
                if self.level <= 0.0 || self.step >= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_times_strictly_increase() {
        let env = Envelope::starting_at(0.0).linear_to(1.0, 0.0).exp_to(0.5, 0.1);
        let pts = env.breakpoints();
        assert!(pts.windows(2).all(|w| w[1].time > w[0].time));
        assert_eq!(pts[0].time, 0.0);
    }

    #[test]
    fn from_breakpoints_validates() {
        let bp = |time, level| Breakpoint { time, level, curve: Curve::Linear };
        assert!(Envelope::from_breakpoints(vec![bp(0.0, 0.0), bp(0.1, 1.0)]).is_ok());
        assert!(Envelope::from_breakpoints(vec![]).is_err());
        assert!(Envelope::from_breakpoints(vec![bp(0.05, 1.0)]).is_err());
        assert!(Envelope::from_breakpoints(vec![bp(0.0, 1.0), bp(0.2, 0.5), bp(0.2, 0.0)]).is_err());
    }

    #[test]
    fn linear_midpoint() {
        let env = Envelope::starting_at(0.0).linear_to(1.0, 1.0);
        assert!((env.level_at(0.5) - 0.5).abs() < 1e-12);
        assert_eq!(env.level_at(-1.0), 0.0);
        assert_eq!(env.level_at(5.0), 1.0);
    }

    #[test]
    fn exponential_midpoint_is_geometric_mean() {
        let env = Envelope::starting_at(1.0).exp_to(0.01, 1.0);
        assert!((env.level_at(0.5) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn exponential_to_zero_uses_floor() {
        let env = Envelope::starting_at(1.0).exp_to(0.0, 0.1);
        let near_end = env.level_at(0.099);
        assert!(near_end.is_finite() && near_end > 0.0, "floor should keep the curve finite, got {near_end}");
        assert!((env.level_at(1.0) - 0.0).abs() < 1e-12, "held level after the end");
    }

    #[test]
    fn cursor_matches_level_at() {
        let env = Envelope::starting_at(0.0).linear_to(1.0, 0.01).exp_to(0.05, 0.2);
        let sr = 1000.0;
        let mut cursor = EnvelopeCursor::new(sr);
        for i in 0..300 {
            let t = i as f64 / sr;
            let a = cursor.next(&env);
            let b = env.level_at(t);
            assert!((a - b).abs() < 1e-9, "sample {i}: cursor {a} vs level_at {b}");
        }
        assert!(cursor.is_finished(&env));
    }

    #[test]
    fn apply_envelope_scales_all_channels() {
        let mut buf = AudioBuffer::from_channels(vec![vec![1.0; 10], vec![-1.0; 10]], 10.0).unwrap();
        apply_envelope(&mut buf, &Envelope::starting_at(1.0).linear_to(0.0, 1.0));
        assert!((buf.channel(0)[5] - 0.5).abs() < 1e-6);
        assert!((buf.channel(1)[5] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn adsr_reaches_peak_then_sustain() {
        let mut env = Adsr::new(44100.0, 0.005, 0.1, 0.7, 0.05);
        assert!(env.is_finished());
        env.gate_on();
        let peak = (0..300).map(|_| env.next_sample()).fold(0.0, f64::max);
        assert!((peak - 1.0).abs() < 1e-9, "attack should reach 1.0, got {peak}");
        for _ in 0..10_000 {
            env.next_sample();
        }
        assert!((env.next_sample() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn adsr_release_from_attack() {
        let mut env = Adsr::new(44100.0, 0.1, 0.1, 0.7, 0.01);
        env.gate_on();
        for _ in 0..100 {
            env.next_sample();
        }
        env.gate_off();
        assert!(env.is_releasing());
        for _ in 0..1000 {
            let s = env.next_sample();
            assert!((0.0..=1.0).contains(&s));
        }
        assert!(env.is_finished());
    }

    #[test]
    fn adsr_zero_times_are_instant() {
        let mut env = Adsr::new(44100.0, 0.0, 0.0, 0.5, 0.0);
        env.gate_on();
        assert_eq!(env.next_sample(), 1.0);
        assert_eq!(env.next_sample(), 0.5);
        env.gate_off();
        assert_eq!(env.next_sample(), 0.0);
        assert!(env.is_finished());
    }
}
