//! Sample pads cut from a loaded recording.
//!
//! A [`SampleBank`] holds one source buffer and up to [`MAX_PADS`] pads
//! extracted from it. Each pad plays at `now + delay1`, and a second time
//! at `now + delay2` when that is set and lands more than a millisecond
//! away from the first.

use std::sync::Arc;

use serde::Serialize;

use crate::dsp::buffer::{AudioBuffer, extract};
use crate::dsp::engine::EngineController;
use crate::dsp::pluck::PitchCurve;
use crate::dsp::voice::VoiceTag;
use crate::error::{Result, SynthError};

pub const MAX_PADS: usize = 12;

/// Minimum separation for the second delay to count as a separate hit.
const DOUBLE_HIT_EPSILON: f64 = 0.001;

/// Spacing of consecutive pads in a batch trigger.
const BATCH_STAGGER: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct Pad {
    pub id: u32,
    pub name: String,
    buffer: Arc<AudioBuffer>,
    pub delay1: f64,
    pub delay2: f64,
}

impl Pad {
    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    pub fn duration(&self) -> f64 {
        self.buffer.duration()
    }

    /// Offsets from the trigger time at which this pad sounds.
    pub fn offsets(&self) -> impl Iterator<Item = f64> {
        let second = (self.delay2 > 0.0 && (self.delay2 - self.delay1).abs() > DOUBLE_HIT_EPSILON)
            .then_some(self.delay2);
        std::iter::once(self.delay1).chain(second)
    }

    pub fn info(&self) -> PadInfo {
        PadInfo {
            id: self.id,
            name: self.name.clone(),
            duration: self.duration(),
            delay1: self.delay1,
            delay2: self.delay2,
        }
    }
}

/// Pad metadata without the audio, for listing in a UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PadInfo {
    pub id: u32,
    pub name: String,
    pub duration: f64,
    pub delay1: f64,
    pub delay2: f64,
}

#[derive(Debug)]
pub struct SampleBank {
    source: Option<AudioBuffer>,
    pads: Vec<Pad>,
    next_id: u32,
    master_gain: f32,
}

impl Default for SampleBank {
    fn default() -> Self {
        SampleBank {
            source: None,
            pads: Vec::with_capacity(MAX_PADS),
            next_id: 1,
            master_gain: 0.8,
        }
    }
}

impl SampleBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the source recording. Existing pads keep their audio.
    pub fn load(&mut self, buffer: AudioBuffer) {
        log::info!(
            "loaded {:.2}s source, {} channel(s) at {} Hz",
            buffer.duration(),
            buffer.num_channels(),
            buffer.sample_rate()
        );
        self.source = Some(buffer);
    }

    /// Decode a WAV or MP3 file and load it as the source.
    #[cfg(feature = "decode")]
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let buffer = crate::decode::decode_audio(bytes)?;
        self.load(buffer);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    /// Length of the loaded source, 0 when nothing is loaded.
    pub fn source_duration(&self) -> f64 {
        self.source.as_ref().map_or(0.0, AudioBuffer::duration)
    }

    /// Cut `[start, end)` seconds from the source into an unattached pad.
    pub fn extract(&self, start: f64, end: f64, name: &str) -> Result<Pad> {
        let buffer = extract(self.source.as_ref(), start, end)?;
        Ok(Pad {
            id: 0,
            name: name.to_string(),
            buffer: Arc::new(buffer),
            delay1: 0.0,
            delay2: 0.0,
        })
    }

    /// Attach a pad and assign it an id.
    pub fn add(&mut self, mut pad: Pad) -> Result<u32> {
        if self.pads.len() >= MAX_PADS {
            return Err(SynthError::BankFull(MAX_PADS));
        }
        pad.id = self.next_id;
        self.next_id += 1;
        let id = pad.id;
        log::debug!("pad {id} '{}' added ({:.3}s)", pad.name, pad.duration());
        self.pads.push(pad);
        Ok(id)
    }

    pub fn remove(&mut self, id: u32) -> Result<Pad> {
        let index = self.index_of(id)?;
        Ok(self.pads.remove(index))
    }

    /// Delays in seconds; negative values are treated as zero.
    pub fn set_delays(&mut self, id: u32, delay1: f64, delay2: f64) -> Result<()> {
        let index = self.index_of(id)?;
        let pad = &mut self.pads[index];
        pad.delay1 = if delay1.is_finite() { delay1.max(0.0) } else { 0.0 };
        pad.delay2 = if delay2.is_finite() { delay2.max(0.0) } else { 0.0 };
        Ok(())
    }

    pub fn pad(&self, id: u32) -> Option<&Pad> {
        self.pads.iter().find(|p| p.id == id)
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn len(&self) -> usize {
        self.pads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pads.is_empty()
    }

    pub fn clear(&mut self) {
        self.pads.clear();
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn set_master_gain(&mut self, gain: f64) {
        if gain.is_finite() {
            self.master_gain = gain.clamp(0.0, 4.0) as f32;
        }
    }

    /// Schedule a pad on the engine. Returns how many hits were queued.
    pub fn play(&self, id: u32, engine: &mut EngineController) -> Result<usize> {
        let pad = self.pad(id).ok_or(SynthError::UnknownPad(id))?;
        let now = engine.now();
        Ok(pad
            .offsets()
            .filter(|offset| self.schedule(&pad.buffer, now + offset, VoiceTag::Pad(id), engine))
            .count())
    }

    /// Play several pads at once, each a millisecond after the previous one.
    /// Unknown ids are skipped.
    pub fn play_many(&self, ids: &[u32], engine: &mut EngineController) -> usize {
        let now = engine.now();
        ids.iter()
            .enumerate()
            .filter(|&(i, &id)| {
                self.pad(id).is_some_and(|pad| {
                    self.schedule(&pad.buffer, now + i as f64 * BATCH_STAGGER, VoiceTag::Pad(id), engine)
                })
            })
            .count()
    }

    /// Audition a pad right away, ignoring its delays.
    pub fn preview(&self, pad: &Pad, engine: &mut EngineController) -> bool {
        let now = engine.now();
        self.schedule(&pad.buffer, now, VoiceTag::OneShot, engine)
    }

    fn schedule(&self, buffer: &Arc<AudioBuffer>, at: f64, tag: VoiceTag, engine: &mut EngineController) -> bool {
        let frame = (at * engine.context().sample_rate).round() as u64;
        engine.play_buffer_at_frame(Arc::clone(buffer), PitchCurve::Constant(1.0), self.master_gain, frame, tag)
    }

    fn index_of(&self, id: u32) -> Result<usize> {
        self.pads
            .iter()
            .position(|p| p.id == id)
            .ok_or(SynthError::UnknownPad(id))
    }
}
