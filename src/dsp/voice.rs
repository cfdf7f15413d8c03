//! Voices and the fixed-capacity voice pool.
//!
//! A [`Voice`] is one sounding (or scheduled) event: a generator plus the
//! absolute frame it starts on, a gain, a pan position and a tag used to
//! address it later (note off, cancelling scheduled sequencer hits). The
//! [`VoicePool`] owns a fixed number of slots allocated up front.

use std::sync::Arc;

use super::buffer::AudioBuffer;
use super::context::AudioContext;
use super::envelope::{Adsr, Envelope, EnvelopeCursor};
use super::oscillator::{Oscillator, Waveform, sine_osc, triangle_osc};
use super::percussion::DrumVoice;
use super::pluck::PitchCurve;
use crate::config::OverflowPolicy;

/// Held-note identity: frequency rounded to 0.01 Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteKey(pub u32);

impl NoteKey {
    pub fn from_frequency(frequency: f64) -> Self {
        NoteKey((frequency.max(0.0) * 100.0).round() as u32)
    }

    pub fn frequency(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

/// What scheduled a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceTag {
    #[default]
    OneShot,
    Note(NoteKey),
    Sequencer,
    Pad(u32),
    Soundboard,
}

/// Sustained guitar-ish tone: triangle plus an octave sine under a gated ADSR.
#[derive(Debug, Clone)]
pub struct ToneVoice {
    body: Oscillator,
    octave: Oscillator,
    env: Adsr,
    velocity: f64,
}

impl ToneVoice {
    pub const ATTACK: f64 = 0.005;
    pub const DECAY: f64 = 0.1;
    pub const SUSTAIN: f64 = 0.7;
    pub const RELEASE: f64 = 0.05;

    pub fn new(ctx: &AudioContext, frequency: f64, velocity: f64) -> Self {
        let mut env = Adsr::new(ctx.sample_rate, Self::ATTACK, Self::DECAY, Self::SUSTAIN, Self::RELEASE);
        env.gate_on();
        ToneVoice {
            body: triangle_osc(ctx, frequency, 0.0),
            octave: sine_osc(ctx, frequency * 2.0, 0.0),
            env,
            velocity: velocity.clamp(0.0, 1.0),
        }
    }

    pub fn release(&mut self) {
        self.env.gate_off();
    }

    pub fn is_finished(&self) -> bool {
        self.env.is_finished()
    }

    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        let raw = self.body.next_sample() * 0.7 + self.octave.next_sample() * 0.3;
        raw * self.env.next_sample() * self.velocity
    }
}

/// Short sine blip with an exponential decay to 0.01.
#[derive(Debug, Clone)]
pub struct BlipVoice {
    osc: Oscillator,
    env: Envelope,
    cursor: EnvelopeCursor,
}

impl BlipVoice {
    pub fn new(ctx: &AudioContext, frequency: f64, duration: f64, velocity: f64) -> Self {
        let velocity = velocity.clamp(1e-3, 1.0);
        BlipVoice {
            osc: Oscillator::with_phase(Waveform::Sine, ctx, frequency, 0.0),
            env: Envelope::starting_at(velocity).exp_to(0.01, duration.max(1e-3)),
            cursor: EnvelopeCursor::new(ctx.sample_rate),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.cursor.is_finished(&self.env)
    }

    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        if self.is_finished() {
            return 0.0;
        }
        self.osc.next_sample() * self.cursor.next(&self.env)
    }
}

/// Plays a shared buffer through a pitch curve.
#[derive(Debug, Clone)]
pub struct SampleVoice {
    buffer: Arc<AudioBuffer>,
    curve: PitchCurve,
    position: f64,
    frame: u64,
}

impl SampleVoice {
    pub fn new(buffer: Arc<AudioBuffer>, curve: PitchCurve) -> Self {
        SampleVoice {
            buffer,
            curve,
            position: 0.0,
            frame: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.position > self.buffer.frames().saturating_sub(1) as f64 || self.buffer.is_empty()
    }

    #[inline]
    pub fn next_frame(&mut self) -> (f64, f64) {
        if self.is_finished() {
            return (0.0, 0.0);
        }
        let left = self.buffer.read_interpolated(0, self.position);
        let right = if self.buffer.num_channels() > 1 {
            self.buffer.read_interpolated(1, self.position)
        } else {
            left
        };
        let time = self.frame as f64 / self.buffer.sample_rate();
        self.position += self.curve.rate_at(time).max(0.0);
        self.frame += 1;
        (left, right)
    }
}

#[derive(Debug, Clone)]
pub enum VoiceSource {
    Drum(DrumVoice),
    Tone(ToneVoice),
    Blip(BlipVoice),
    Sample(SampleVoice),
}

#[derive(Debug, Clone)]
pub struct Voice {
    pub source: VoiceSource,
    /// Absolute frame (engine clock) of the first sample.
    pub start_frame: u64,
    pub gain: f32,
    /// -1 (left) to 1 (right).
    pub pan: f32,
    pub tag: VoiceTag,
    /// Caller-assigned identity, echoed back when the voice is retired.
    id: u64,
    serial: u64,
}

impl Voice {
    pub fn new(source: VoiceSource, start_frame: u64) -> Self {
        Voice {
            source,
            start_frame,
            gain: 1.0,
            pan: 0.0,
            tag: VoiceTag::OneShot,
            id: 0,
            serial: 0,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn with_tag(mut self, tag: VoiceTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = pan.clamp(-1.0, 1.0);
        self
    }

    /// Gate off. Only sustained voices respond; one-shots ring out.
    pub fn release(&mut self) {
        if let VoiceSource::Tone(tone) = &mut self.source {
            tone.release();
        }
    }

    pub fn is_finished(&self) -> bool {
        match &self.source {
            VoiceSource::Drum(v) => v.is_finished(),
            VoiceSource::Tone(v) => v.is_finished(),
            VoiceSource::Blip(v) => v.is_finished(),
            VoiceSource::Sample(v) => v.is_finished(),
        }
    }

    /// Next stereo frame before gain and pan.
    #[inline]
    pub fn next_frame(&mut self) -> (f32, f32) {
        let (l, r) = match &mut self.source {
            VoiceSource::Drum(v) => {
                let s = v.next_sample();
                (s, s)
            }
            VoiceSource::Tone(v) => {
                let s = v.next_sample();
                (s, s)
            }
            VoiceSource::Blip(v) => {
                let s = v.next_sample();
                (s, s)
            }
            VoiceSource::Sample(v) => v.next_frame(),
        };
        (l as f32, r as f32)
    }
}

/// Result of offering a voice to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Placed,
    /// The oldest voice was evicted to make room.
    Stole,
    Dropped,
}

/// Fixed slots; no allocation after construction.
///
/// Voices leave the pool through a `retire` callback (or, for `insert`, the
/// returned value) instead of being dropped in place, so the owner decides
/// which thread frees them.
#[derive(Debug, Clone)]
pub struct VoicePool {
    slots: Vec<Option<Voice>>,
    policy: OverflowPolicy,
    next_serial: u64,
    dropped: u64,
}

impl VoicePool {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        VoicePool {
            slots: (0..capacity.max(1)).map(|_| None).collect(),
            policy,
            next_serial: 0,
            dropped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Voices dropped or evicted because the pool was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Offer a voice. Also returns whichever voice did not end up in the
    /// pool: the evicted one on `Stole`, the offered one on `Dropped`.
    pub fn insert(&mut self, mut voice: Voice) -> (Admission, Option<Voice>) {
        voice.serial = self.next_serial;
        self.next_serial += 1;

        if let Some(free) = self.slots.iter_mut().find(|s| s.is_none()) {
            *free = Some(voice);
            return (Admission::Placed, None);
        }
        self.dropped += 1;
        match self.policy {
            OverflowPolicy::DropNew => (Admission::Dropped, Some(voice)),
            OverflowPolicy::StealOldest => {
                let oldest = self
                    .slots
                    .iter_mut()
                    .min_by_key(|s| s.as_ref().map_or(u64::MAX, |v| v.serial));
                match oldest {
                    Some(slot) => (Admission::Stole, slot.replace(voice)),
                    None => (Admission::Dropped, Some(voice)),
                }
            }
        }
    }

    pub fn release(&mut self, tag: VoiceTag) {
        for voice in self.slots.iter_mut().flatten() {
            if voice.tag == tag {
                voice.release();
            }
        }
    }

    pub fn release_all(&mut self) {
        for voice in self.slots.iter_mut().flatten() {
            voice.release();
        }
    }

    /// Remove voices with `tag` that have not started by `frame`.
    pub fn cancel_pending(&mut self, tag: VoiceTag, frame: u64, mut retire: impl FnMut(Voice)) -> usize {
        let mut cancelled = 0;
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|v| v.tag == tag && v.start_frame > frame) {
                if let Some(voice) = slot.take() {
                    retire(voice);
                }
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn clear(&mut self, mut retire: impl FnMut(Voice)) {
        for voice in self.slots.iter_mut().filter_map(Option::take) {
            retire(voice);
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.slots.iter_mut().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.slots.iter().flatten()
    }

    /// Free the slots of voices that have finished.
    pub fn reap(&mut self, mut retire: impl FnMut(Voice)) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(Voice::is_finished) {
                if let Some(voice) = slot.take() {
                    retire(voice);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::percussion::{Drum, DrumKit};
    use crate::rng::Rng;

    fn ctx() -> AudioContext {
        AudioContext::new(44100.0, 128)
    }

    fn blip(start: u64) -> Voice {
        Voice::new(VoiceSource::Blip(BlipVoice::new(&ctx(), 440.0, 0.1, 1.0)), start)
    }

    #[test]
    fn note_key_rounds_to_hundredths() {
        assert_eq!(NoteKey::from_frequency(440.004), NoteKey::from_frequency(440.0));
        assert_ne!(NoteKey::from_frequency(440.01), NoteKey::from_frequency(440.0));
        assert!((NoteKey::from_frequency(82.41).frequency() - 82.41).abs() < 1e-9);
    }

    #[test]
    fn tone_voice_sustains_until_released() {
        let mut voice = ToneVoice::new(&ctx(), 220.0, 1.0);
        for _ in 0..44100 {
            voice.next_sample();
        }
        assert!(!voice.is_finished(), "held tone must keep sounding");
        voice.release();
        // 50 ms release
        for _ in 0..2300 {
            voice.next_sample();
        }
        assert!(voice.is_finished());
    }

    #[test]
    fn tone_voice_peaks_near_velocity() {
        let mut voice = ToneVoice::new(&ctx(), 110.0, 0.5);
        let peak = (0..4410).map(|_| voice.next_sample().abs()).fold(0.0, f64::max);
        assert!(peak > 0.3 && peak <= 0.5 + 1e-9, "peak {peak}");
    }

    #[test]
    fn blip_finishes_after_duration() {
        let mut v = BlipVoice::new(&ctx(), 1000.0, 0.1, 0.8);
        let mut frames = 0;
        while !v.is_finished() {
            v.next_sample();
            frames += 1;
            assert!(frames < 10_000);
        }
        assert!((4400..=4420).contains(&frames), "frames {frames}");
    }

    #[test]
    fn sample_voice_plays_buffer_at_rate() {
        let buf = Arc::new(AudioBuffer::from_mono((0..100).map(|i| i as f32).collect(), 44100.0));
        let mut v = SampleVoice::new(Arc::clone(&buf), PitchCurve::Constant(2.0));
        let (a, _) = v.next_frame();
        let (b, c) = v.next_frame();
        assert_eq!(a, 0.0);
        assert_eq!(b, 2.0);
        assert_eq!(c, 2.0);
        let mut n = 2;
        while !v.is_finished() {
            v.next_frame();
            n += 1;
        }
        assert_eq!(n, 50);
    }

    #[test]
    fn steal_oldest_evicts_first_inserted() {
        let mut pool = VoicePool::new(2, OverflowPolicy::StealOldest);
        assert_eq!(pool.insert(blip(0).with_tag(VoiceTag::Pad(1))).0, Admission::Placed);
        assert_eq!(pool.insert(blip(0).with_tag(VoiceTag::Pad(2))).0, Admission::Placed);
        let (admission, evicted) = pool.insert(blip(0).with_tag(VoiceTag::Pad(3)));
        assert_eq!(admission, Admission::Stole);
        assert_eq!(evicted.map(|v| v.tag), Some(VoiceTag::Pad(1)));
        let tags: Vec<_> = pool.iter().map(|v| v.tag).collect();
        assert!(!tags.contains(&VoiceTag::Pad(1)));
        assert!(tags.contains(&VoiceTag::Pad(3)));
        assert_eq!(pool.dropped(), 1);
        assert_eq!(pool.active(), 2);
    }

    #[test]
    fn drop_new_keeps_existing_voices() {
        let mut pool = VoicePool::new(1, OverflowPolicy::DropNew);
        pool.insert(blip(0).with_tag(VoiceTag::Pad(1)));
        let (admission, rejected) = pool.insert(blip(0).with_tag(VoiceTag::Pad(2)));
        assert_eq!(admission, Admission::Dropped);
        assert_eq!(rejected.map(|v| v.tag), Some(VoiceTag::Pad(2)));
        assert_eq!(pool.iter().next().map(|v| v.tag), Some(VoiceTag::Pad(1)));
        assert_eq!(pool.dropped(), 1);
    }

    #[test]
    fn cancel_pending_only_touches_future_voices() {
        let mut pool = VoicePool::new(8, OverflowPolicy::StealOldest);
        pool.insert(blip(100).with_tag(VoiceTag::Sequencer));
        pool.insert(blip(5000).with_tag(VoiceTag::Sequencer));
        pool.insert(blip(5000).with_tag(VoiceTag::OneShot));
        let mut cancelled = Vec::new();
        assert_eq!(pool.cancel_pending(VoiceTag::Sequencer, 1000, |v| cancelled.push(v.start_frame)), 1);
        assert_eq!(cancelled, vec![5000]);
        assert_eq!(pool.active(), 2);
    }

    #[test]
    fn release_only_affects_matching_note() {
        let mut pool = VoicePool::new(4, OverflowPolicy::StealOldest);
        let a = NoteKey::from_frequency(220.0);
        let b = NoteKey::from_frequency(330.0);
        for key in [a, b] {
            let tone = ToneVoice::new(&ctx(), key.frequency(), 1.0);
            pool.insert(Voice::new(VoiceSource::Tone(tone), 0).with_tag(VoiceTag::Note(key)));
        }
        pool.release(VoiceTag::Note(a));
        for voice in pool.iter_mut() {
            for _ in 0..4410 {
                voice.next_frame();
            }
        }
        let mut ended = Vec::new();
        pool.reap(|v| ended.push(v.tag));
        assert_eq!(ended, vec![VoiceTag::Note(a)]);
        assert_eq!(pool.active(), 1);
        assert_eq!(pool.iter().next().map(|v| v.tag), Some(VoiceTag::Note(b)));
    }

    #[test]
    fn drum_voice_in_pool_finishes() {
        let mut kit = DrumKit::new(&ctx(), 2.0, &mut Rng::new_with_seed(3));
        let mut pool = VoicePool::new(4, OverflowPolicy::StealOldest);
        pool.insert(Voice::new(VoiceSource::Drum(kit.voice(Drum::ClosedHat, 1.0)), 0));
        for _ in 0..44100 / 10 {
            for v in pool.iter_mut() {
                v.next_frame();
            }
        }
        pool.reap(drop);
        assert_eq!(pool.active(), 0);
    }

    #[test]
    fn ids_travel_with_the_voice() {
        let mut pool = VoicePool::new(1, OverflowPolicy::StealOldest);
        pool.insert(blip(0).with_id(7));
        let (_, evicted) = pool.insert(blip(0).with_id(8));
        assert_eq!(evicted.map(|v| v.id()), Some(7));
        let mut cleared = Vec::new();
        pool.clear(|v| cleared.push(v.id()));
        assert_eq!(cleared, vec![8]);
        assert_eq!(pool.active(), 0);
    }
}
