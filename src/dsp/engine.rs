//! Real-time engine: voice pool, mixer and effect chain behind a command queue.
//!
//! [`Engine::new`] returns two halves. The [`Engine`] lives on the audio
//! thread and only ever renders; the [`EngineController`] lives on the
//! control side, builds voices and effect chains there, and sends them over
//! a bounded channel. The engine drains the channel at the start of every
//! block, so each command lands atomically between blocks. Everything the
//! render path touches is sized at construction, and whatever it lets go
//! of (ended voices, replaced chains and nodes) goes back over a second
//! channel to be dropped on the control side.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use super::buffer::AudioBuffer;
use super::context::AudioContext;
use super::effect::{ChainConfig, Effect, EffectChain, EffectNode, lookup};
use super::mixer::Mixer;
use super::percussion::{Drum, DrumKit};
use super::pluck::PitchCurve;
use super::voice::{BlipVoice, NoteKey, SampleVoice, ToneVoice, Voice, VoicePool, VoiceSource, VoiceTag};
use crate::config::EngineConfig;
use crate::error::{Result, SynthError};
use crate::rng::Rng;
use crate::sequencer::{TriggerEvent, TriggerSink};

/// Room in the retired queue beyond one entry per voice and per command.
const RETIRED_SLACK: usize = 8;

/// Control -> render messages.
#[derive(Debug)]
pub enum Command {
    Start(Voice),
    Release(NoteKey),
    ReleaseAll,
    /// Remove voices with `tag` scheduled to start after `after_frame`.
    Cancel { tag: VoiceTag, after_frame: u64 },
    SetChain(Box<EffectChain>),
    /// Swap the node at `index` for one built on the control side.
    ReplaceNode { index: usize, node: Box<EffectNode> },
    /// Parameters that rebuild the effect (`EffectKind::rebuilds_on`) are
    /// ignored here; they arrive as `ReplaceNode`.
    SetEffectParam { index: usize, name: &'static str, value: f64 },
    SetEffectEnabled { index: usize, enabled: bool },
    SetMasterGain(f32),
    /// Silence everything immediately and clear effect tails.
    StopAll,
}

/// Render -> control hand-back, so freeing happens off the render thread.
#[derive(Debug)]
pub enum Retired {
    Chain(Box<EffectChain>),
    Node(Box<EffectNode>),
    Voice(Voice),
}

/// A full queue means the controller is not collecting; the item drops here.
fn retire(tx: &Sender<Retired>, item: Retired) {
    let _ = tx.try_send(item);
}

/// Render -> control counters.
#[derive(Debug, Default)]
pub struct EngineStatus {
    frame: AtomicU64,
    active: AtomicUsize,
    dropped: AtomicU64,
}

impl EngineStatus {
    /// Frames rendered so far: the audio clock.
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    pub fn active_voices(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Voices lost to pool overflow.
    pub fn dropped_voices(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn set_frame(&self, frame: u64) {
        self.frame.store(frame, Ordering::Release);
    }
}

pub struct Engine {
    ctx: AudioContext,
    pool: VoicePool,
    mixer: Mixer,
    chain: Box<EffectChain>,
    commands: Receiver<Command>,
    retired: Sender<Retired>,
    status: Arc<EngineStatus>,
    frame: u64,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Result<(Engine, EngineController)> {
        config.validate()?;
        let ctx = config.context();
        let (tx, rx) = bounded(config.command_capacity);
        let (retired_tx, retired_rx) = bounded(config.max_voices + config.command_capacity + RETIRED_SLACK);
        let status = Arc::new(EngineStatus::default());
        let mut rng = Rng::from_optional_seed(config.seed);
        let kit = DrumKit::new(&ctx, config.noise_seconds, &mut rng);

        let engine = Engine {
            ctx,
            pool: VoicePool::new(config.max_voices, config.overflow),
            mixer: Mixer::new(ctx.block_size, config.master_gain as f32),
            chain: Box::default(),
            commands: rx,
            retired: retired_tx,
            status: Arc::clone(&status),
            frame: 0,
        };
        let controller = EngineController {
            ctx,
            tx,
            retired: retired_rx,
            status,
            kit,
            held: HashMap::new(),
            next_note_id: 0,
            chain: ChainConfig::default(),
        };
        log::info!(
            "engine ready: {} Hz, block {}, {} voices ({:?})",
            config.sample_rate,
            ctx.block_size,
            config.max_voices,
            config.overflow
        );
        Ok((engine, controller))
    }

    pub fn context(&self) -> &AudioContext {
        &self.ctx
    }

    pub fn status(&self) -> Arc<EngineStatus> {
        Arc::clone(&self.status)
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn active_voices(&self) -> usize {
        self.pool.active()
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    /// Fill both output slices. Work is split into `block_size` pieces and
    /// commands are applied before each piece.
    pub fn process(&mut self, out_left: &mut [f32], out_right: &mut [f32]) {
        let frames = out_left.len().min(out_right.len());
        let block = self.ctx.block_size;
        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(block);
            self.render_block(&mut out_left[offset..offset + n], &mut out_right[offset..offset + n]);
            offset += n;
        }
    }

    /// Render `frames` frames into a new stereo buffer.
    pub fn render_offline(&mut self, frames: usize) -> AudioBuffer {
        let mut out = AudioBuffer::new(2, frames, self.ctx.sample_rate);
        let channels = out.channels_mut();
        let (left, right) = channels.split_at_mut(1);
        self.process(&mut left[0], &mut right[0]);
        out
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.commands.try_recv() {
            self.apply(cmd);
        }
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::Start(voice) => {
                if let (_, Some(out)) = self.pool.insert(voice) {
                    retire(&self.retired, Retired::Voice(out));
                }
            }
            Command::Release(key) => self.pool.release(VoiceTag::Note(key)),
            Command::ReleaseAll => self.pool.release_all(),
            Command::Cancel { tag, after_frame } => {
                let retired = &self.retired;
                self.pool
                    .cancel_pending(tag, after_frame, |v| retire(retired, Retired::Voice(v)));
            }
            Command::SetChain(chain) => {
                let old = std::mem::replace(&mut self.chain, chain);
                retire(&self.retired, Retired::Chain(old));
            }
            Command::ReplaceNode { index, mut node } => {
                // On a bad index `node` is still the new one; it goes back unused.
                self.chain.swap_node(index, &mut node);
                retire(&self.retired, Retired::Node(node));
            }
            Command::SetEffectParam { index, name, value } => {
                let rebuilds = self.chain.node(index).is_some_and(|n| n.kind().rebuilds_on(name));
                if !rebuilds {
                    let _ = self.chain.set_parameter(index, name, value);
                }
            }
            Command::SetEffectEnabled { index, enabled } => self.chain.set_enabled(index, enabled),
            Command::SetMasterGain(gain) => self.mixer.master_gain = gain,
            Command::StopAll => {
                let retired = &self.retired;
                self.pool.clear(|v| retire(retired, Retired::Voice(v)));
                self.chain.reset();
            }
        }
    }

    fn render_block(&mut self, out_left: &mut [f32], out_right: &mut [f32]) {
        self.drain_commands();
        let n = out_left.len();
        let block_start = self.frame;
        let block_end = block_start + n as u64;

        self.mixer.clear(n);
        for voice in self.pool.iter_mut() {
            if voice.start_frame >= block_end {
                continue;
            }
            // Late voices start at the top of the block.
            let first = voice.start_frame.saturating_sub(block_start) as usize;
            for i in first..n {
                let frame = voice.next_frame();
                self.mixer.add(i, frame, voice.gain, voice.pan);
            }
        }
        let retired = &self.retired;
        self.pool.reap(|v| retire(retired, Retired::Voice(v)));

        let (left, right) = self.mixer.bus_mut();
        self.chain.process_block(left, right);
        self.mixer.write_output(out_left, out_right);

        self.frame = block_end;
        self.status.set_frame(self.frame);
        self.status.active.store(self.pool.active(), Ordering::Relaxed);
        self.status.dropped.store(self.pool.dropped(), Ordering::Relaxed);
    }
}

/// Control-side handle. Builds voices and chains here so the render thread
/// never allocates.
pub struct EngineController {
    ctx: AudioContext,
    tx: Sender<Command>,
    retired: Receiver<Retired>,
    status: Arc<EngineStatus>,
    kit: DrumKit,
    /// Held notes and the id of the voice sounding each.
    held: HashMap<NoteKey, u64>,
    next_note_id: u64,
    /// What the engine's chain was last set to, parameters included.
    chain: ChainConfig,
}

impl EngineController {
    pub fn context(&self) -> &AudioContext {
        &self.ctx
    }

    pub fn status(&self) -> Arc<EngineStatus> {
        Arc::clone(&self.status)
    }

    /// Current audio clock in frames.
    pub fn now_frame(&self) -> u64 {
        self.status.frame()
    }

    pub fn now(&self) -> f64 {
        self.ctx.seconds(self.now_frame())
    }

    pub fn kit_mut(&mut self) -> &mut DrumKit {
        &mut self.kit
    }

    /// Queue a command. A full queue drops it. Retired items are collected
    /// first.
    pub fn send(&mut self, cmd: Command) -> bool {
        self.collect_retired();
        match self.tx.try_send(cmd) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("engine command queue full, dropping command");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("engine dropped, command ignored");
                false
            }
        }
    }

    /// One-shot drum hit as soon as possible.
    pub fn trigger(&mut self, drum: Drum, velocity: f64) -> bool {
        let frame = self.now_frame();
        self.trigger_at_frame(drum, velocity, frame, VoiceTag::OneShot)
    }

    pub fn trigger_name(&mut self, instrument: &str, velocity: f64) -> Result<bool> {
        let drum: Drum = instrument.parse()?;
        Ok(self.trigger(drum, velocity))
    }

    pub fn trigger_at_frame(&mut self, drum: Drum, velocity: f64, frame: u64, tag: VoiceTag) -> bool {
        let voice = self.kit.voice(drum, velocity.clamp(0.0, 1.0));
        self.send(Command::Start(Voice::new(VoiceSource::Drum(voice), frame).with_tag(tag)))
    }

    /// Start a sustained tone. A note still sounding at this frequency is
    /// not retriggered; returns whether a voice was started.
    ///
    /// A note whose voice the engine has evicted or dropped counts as
    /// ended, so it can be played again without a `note_off`.
    pub fn note_on(&mut self, frequency: f64, velocity: f64) -> bool {
        if !(frequency.is_finite() && frequency > 0.0) {
            log::debug!("note_on ignored: bad frequency {frequency}");
            return false;
        }
        self.collect_retired();
        let key = NoteKey::from_frequency(frequency);
        if self.held.contains_key(&key) {
            return false;
        }
        self.next_note_id += 1;
        let id = self.next_note_id;
        let tone = ToneVoice::new(&self.ctx, frequency, velocity.clamp(0.0, 1.0));
        let voice = Voice::new(VoiceSource::Tone(tone), self.now_frame())
            .with_tag(VoiceTag::Note(key))
            .with_id(id);
        let sent = self.send(Command::Start(voice));
        if sent {
            self.held.insert(key, id);
        }
        sent
    }

    pub fn note_off(&mut self, frequency: f64) {
        let key = NoteKey::from_frequency(frequency);
        if self.held.remove(&key).is_some() {
            self.send(Command::Release(key));
        }
    }

    pub fn all_notes_off(&mut self) {
        self.held.clear();
        self.send(Command::ReleaseAll);
    }

    pub fn held_notes(&mut self) -> usize {
        self.collect_retired();
        self.held.len()
    }

    /// Short sine blip with an exponential decay.
    pub fn blip_at_frame(&mut self, frequency: f64, duration: f64, velocity: f64, frame: u64, tag: VoiceTag) -> bool {
        let blip = BlipVoice::new(&self.ctx, frequency, duration, velocity.clamp(0.0, 1.0));
        self.send(Command::Start(Voice::new(VoiceSource::Blip(blip), frame).with_tag(tag)))
    }

    /// Play a shared buffer through `curve`.
    pub fn play_buffer_at_frame(
        &mut self,
        buffer: Arc<AudioBuffer>,
        curve: PitchCurve,
        gain: f32,
        frame: u64,
        tag: VoiceTag,
    ) -> bool {
        let voice = Voice::new(VoiceSource::Sample(SampleVoice::new(buffer, curve)), frame)
            .with_tag(tag)
            .with_gain(gain);
        self.send(Command::Start(voice))
    }

    pub fn cancel(&mut self, tag: VoiceTag, after_frame: u64) -> bool {
        self.send(Command::Cancel { tag, after_frame })
    }

    /// Swap in a whole chain built on this thread.
    pub fn set_chain(&mut self, chain: EffectChain) -> bool {
        let config = chain.config();
        let sent = self.send(Command::SetChain(Box::new(chain)));
        if sent {
            self.chain = config;
        }
        sent
    }

    /// The engine's chain as last set from here.
    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain
    }

    pub fn set_chain_config(&mut self, config: &ChainConfig) -> Result<bool> {
        let chain = EffectChain::from_config(&self.ctx, config)?;
        Ok(self.set_chain(chain))
    }

    /// Change one parameter of the effect at `index`. The value is clamped
    /// here; an unknown index or name is an error.
    ///
    /// Parameters that rebuild the effect are applied to a new node built
    /// on this thread, which replaces the running one whole.
    pub fn set_effect_parameter(&mut self, index: usize, name: &str, value: f64) -> Result<bool> {
        let slot = self.chain.effects.get(index).ok_or_else(|| {
            SynthError::configuration("index", index as f64, "no effect at this chain position")
        })?;
        let kind = slot.effect;
        let spec = lookup(kind.params(), kind, name)?;
        let value = spec.clamp(value);

        let sent = if kind.rebuilds_on(spec.name) {
            let mut params = slot.params.clone();
            params.insert(spec.name.to_string(), value);
            let node = EffectNode::from_params(kind, &self.ctx, &params)?;
            log::debug!("replacing {kind} at {index}: {} = {value}", spec.name);
            self.send(Command::ReplaceNode {
                index,
                node: Box::new(node),
            })
        } else {
            self.send(Command::SetEffectParam {
                index,
                name: spec.name,
                value,
            })
        };
        if sent {
            self.chain.effects[index].params.insert(spec.name.to_string(), value);
        }
        Ok(sent)
    }

    pub fn set_effect_enabled(&mut self, index: usize, enabled: bool) -> bool {
        let sent = self.send(Command::SetEffectEnabled { index, enabled });
        if let (true, Some(slot)) = (sent, self.chain.effects.get_mut(index)) {
            slot.enabled = enabled;
        }
        sent
    }

    pub fn set_master_gain(&mut self, gain: f64) -> bool {
        if !gain.is_finite() {
            return false;
        }
        self.send(Command::SetMasterGain(gain.clamp(0.0, 4.0) as f32))
    }

    pub fn stop_all(&mut self) -> bool {
        self.held.clear();
        self.send(Command::StopAll)
    }

    /// Drop whatever the engine has handed back and forget notes whose
    /// voice has ended. Returns how many items were collected.
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        while let Ok(item) = self.retired.try_recv() {
            if let Retired::Voice(voice) = &item {
                if let VoiceTag::Note(key) = voice.tag {
                    if self.held.get(&key) == Some(&voice.id()) {
                        self.held.remove(&key);
                    }
                }
            }
            count += 1;
        }
        count
    }

    fn frame_at(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.ctx.sample_rate).round() as u64
    }
}

impl TriggerSink for EngineController {
    fn trigger_at(&mut self, event: TriggerEvent) {
        let frame = self.frame_at(event.time);
        self.trigger_at_frame(event.instrument, event.velocity, frame, VoiceTag::Sequencer);
    }

    fn cancel_after(&mut self, now: f64) {
        let frame = self.frame_at(now);
        self.cancel(VoiceTag::Sequencer, frame);
    }
}
