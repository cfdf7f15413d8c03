//! Karplus-Strong plucked string, chords, and pitch bends.
//!
//! A string is a delay line one period long, seeded with noise and fed
//! back through a one-zero low-pass. Chords sum several strings with a
//! strum offset. Bends and slides resample a finished buffer instead of
//! resynthesizing it.

use super::buffer::AudioBuffer;
use super::context::AudioContext;
use super::delay_line::DelayLine;
use super::note::{midi_to_frequency, parse_pitch_class};
use crate::error::{Result, SynthError, check_range};
use crate::rng::Rng;

/// Longest strum spread between the first and last note.
pub const MAX_STRUM_SECONDS: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PluckParams {
    /// Hz, must be positive.
    pub frequency: f64,
    /// Seconds of output.
    pub duration: f64,
    pub velocity: f64,
    /// Feedback gain, strictly between 0 and 1.
    pub damping: f64,
    /// Weight of the current cell in the feedback average.
    pub brightness: f64,
}

impl Default for PluckParams {
    fn default() -> Self {
        PluckParams {
            frequency: 110.0,
            duration: 2.0,
            velocity: 0.8,
            damping: 0.996,
            brightness: 0.5,
        }
    }
}

impl PluckParams {
    pub fn new(frequency: f64, duration: f64) -> Self {
        PluckParams {
            frequency,
            duration,
            ..PluckParams::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(SynthError::configuration("frequency", self.frequency, "must be a positive frequency"));
        }
        check_range("duration", self.duration, 0.0, 30.0)?;
        check_range("velocity", self.velocity, 0.0, 1.0)?;
        if !(self.damping > 0.0 && self.damping < 1.0) {
            return Err(SynthError::configuration("damping", self.damping, "must be inside (0, 1)"));
        }
        check_range("brightness", self.brightness, 0.0, 1.0)?;
        Ok(())
    }
}

/// A single string, streamed one sample at a time.
#[derive(Debug, Clone)]
pub struct KarplusStrong {
    line: DelayLine,
    damping: f32,
    brightness: f32,
}

impl KarplusStrong {
    /// Allocate and excite the string.
    pub fn new(ctx: &AudioContext, params: &PluckParams, rng: &mut Rng) -> Result<Self> {
        params.validate()?;
        let mut line = DelayLine::for_frequency(ctx.sample_rate, params.frequency);
        let velocity = params.velocity;
        line.fill_with(|| (rng.rand_bipolar() * velocity) as f32);
        Ok(KarplusStrong {
            line,
            damping: params.damping as f32,
            brightness: params.brightness as f32,
        })
    }

    pub fn delay_length(&self) -> usize {
        self.line.len()
    }

    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let current = self.line.current();
        let next = self.line.next_cell();
        let b = self.brightness;
        self.line.write(self.damping * (b * current + (1.0 - b) * next));
        self.line.advance();
        current
    }
}

/// Render one plucked note as a mono buffer of `duration * sample_rate` frames.
pub fn pluck(ctx: &AudioContext, params: &PluckParams, rng: &mut Rng) -> Result<AudioBuffer> {
    let mut string = KarplusStrong::new(ctx, params, rng)?;
    let frames = ctx.frames(params.duration);
    let data = (0..frames).map(|_| string.next_sample()).collect();
    Ok(AudioBuffer::from_mono(data, ctx.sample_rate))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrumDirection {
    /// Lowest note first.
    #[default]
    Down,
    /// Highest note first.
    Up,
}

/// Sum one string per frequency, each delayed by its strum offset.
///
/// `frequencies` are given low to high; an upward strum reverses them.
/// `strum` is the gap between consecutive notes, clamped to a total spread
/// of [`MAX_STRUM_SECONDS`]. The mix is scaled by `1/sqrt(n)`.
pub fn chord(
    ctx: &AudioContext,
    frequencies: &[f64],
    strum: f64,
    direction: StrumDirection,
    template: &PluckParams,
    rng: &mut Rng,
) -> Result<AudioBuffer> {
    if frequencies.is_empty() {
        return Err(SynthError::configuration("frequencies", 0.0, "a chord needs at least one note"));
    }
    let n = frequencies.len();
    let spread = (strum.max(0.0) * (n - 1) as f64).min(MAX_STRUM_SECONDS);
    let gap = if n > 1 { spread / (n - 1) as f64 } else { 0.0 };

    let mut out = AudioBuffer::new(1, ctx.frames(template.duration + spread), ctx.sample_rate);
    let gain = 1.0 / (n as f32).sqrt();

    let mut order: Vec<f64> = frequencies.to_vec();
    if direction == StrumDirection::Up {
        order.reverse();
    }
    for (i, &frequency) in order.iter().enumerate() {
        let note = pluck(ctx, &PluckParams { frequency, ..*template }, rng)?;
        out.mix_in(&note, ctx.frames(gap * i as f64), gain);
    }
    Ok(out)
}

/// Chord qualities and their intervals in semitones from the root.
const CHORD_QUALITIES: &[(&str, &[i32])] = &[
    ("", &[0, 4, 7]),
    ("maj", &[0, 4, 7]),
    ("m", &[0, 3, 7]),
    ("min", &[0, 3, 7]),
    ("7", &[0, 4, 7, 10]),
    ("maj7", &[0, 4, 7, 11]),
    ("m7", &[0, 3, 7, 10]),
    ("dim", &[0, 3, 6]),
    ("aug", &[0, 4, 8]),
    ("sus2", &[0, 2, 7]),
    ("sus4", &[0, 5, 7]),
];

/// Frequencies of a named chord ("E", "Am", "G7", "Cmaj7", "F#m7", ...),
/// voiced upward from the root in octave 3.
pub fn chord_frequencies(name: &str) -> Result<Vec<f64>> {
    let unknown = || SynthError::UnknownChord(name.to_string());
    let (semitone, quality) = parse_pitch_class(name.trim()).ok_or_else(unknown)?;
    let intervals = CHORD_QUALITIES
        .iter()
        .find(|(q, _)| *q == quality)
        .map(|(_, iv)| *iv)
        .ok_or_else(unknown)?;
    // C3 = MIDI 48
    let root = 48 + semitone;
    Ok(intervals
        .iter()
        .map(|iv| midi_to_frequency(root + iv, 440.0))
        .collect())
}

/// Time-varying playback rate for resampling a rendered note.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PitchCurve {
    /// Fixed rate (1.0 = original pitch).
    Constant(f64),
    /// Playback rate ramps linearly from `from` to `to`.
    Slide { from: f64, to: f64, delay: f64, duration: f64 },
    /// Pitch ramps linearly in semitones from 0 to `semitones`.
    Bend { semitones: f64, delay: f64, duration: f64 },
}

impl PitchCurve {
    /// Slide between two frequencies, expressed as rates relative to `from_hz`.
    pub fn slide(from_hz: f64, to_hz: f64, delay: f64, duration: f64) -> Self {
        PitchCurve::Slide {
            from: 1.0,
            to: to_hz / from_hz,
            delay,
            duration,
        }
    }

    pub fn rate_at(&self, time: f64) -> f64 {
        let progress = |delay: f64, duration: f64| {
            if duration <= 0.0 {
                if time >= delay { 1.0 } else { 0.0 }
            } else {
                ((time - delay) / duration).clamp(0.0, 1.0)
            }
        };
        match *self {
            PitchCurve::Constant(rate) => rate,
            PitchCurve::Slide { from, to, delay, duration } => from + (to - from) * progress(delay, duration),
            PitchCurve::Bend { semitones, delay, duration } => {
                2.0_f64.powf(semitones * progress(delay, duration) / 12.0)
            }
        }
    }
}

/// Read `source` through `curve`, producing the same number of frames.
///
/// The read position advances by the curve's rate each output frame; once
/// it runs off the end of the source the rest of the output is silent.
pub fn resample(source: &AudioBuffer, curve: &PitchCurve) -> AudioBuffer {
    let frames = source.frames();
    let sample_rate = source.sample_rate();
    let mut out = AudioBuffer::new(source.num_channels(), frames, sample_rate);
    let last = frames.saturating_sub(1) as f64;
    let mut position = 0.0_f64;
    for frame in 0..frames {
        if position > last {
            break;
        }
        for ch in 0..source.num_channels() {
            out.channel_mut(ch)[frame] = source.read_interpolated(ch, position) as f32;
        }
        position += curve.rate_at(frame as f64 / sample_rate).max(0.0);
    }
    out
}
