//! The step sequencer: pattern, clock and transport state.
//!
//! `tick(now, sink)` is the whole scheduling loop. Every step whose deadline
//! falls inside `now + lookahead` is fired, one [`TriggerEvent`] per active
//! instrument, each stamped with the step's exact time rather than the time
//! of the tick. Ticks may arrive late or jittery; as long as the tick period
//! fits inside the look-ahead window the audio side still sees every hit
//! ahead of time.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::clock::SequencerClock;
use super::generator::generate;
use super::pattern::Pattern;
use super::{Style, TriggerEvent, TriggerSink};
use crate::config::SequencerConfig;
use crate::dsp::percussion::Drum;
use crate::error::Result;
use crate::rng::Rng;

pub const MIN_BPM: f64 = 60.0;
pub const MAX_BPM: f64 = 200.0;
pub const MAX_SWING: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Stopped,
    Playing,
}

/// Lock-free view of the transport for UI polling.
#[derive(Debug, Default)]
pub struct TransportStatus {
    playing: AtomicBool,
    step: AtomicUsize,
}

impl TransportStatus {
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn current_step(&self) -> usize {
        self.step.load(Ordering::Acquire)
    }

    fn publish(&self, playing: bool, step: usize) {
        self.step.store(step, Ordering::Release);
        self.playing.store(playing, Ordering::Release);
    }
}

type StepListener = Box<dyn FnMut(usize) + Send>;

pub struct Sequencer {
    pattern: Pattern,
    style: Style,
    complexity: f64,
    clock: SequencerClock,
    transport: Transport,
    lookahead: f64,
    velocity: f64,
    rng: Rng,
    status: Arc<TransportStatus>,
    on_step: Option<StepListener>,
}

impl fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequencer")
            .field("style", &self.style)
            .field("complexity", &self.complexity)
            .field("clock", &self.clock)
            .field("transport", &self.transport)
            .field("lookahead", &self.lookahead)
            .finish_non_exhaustive()
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::build(&SequencerConfig::default())
    }
}

impl Sequencer {
    pub fn new(config: &SequencerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &SequencerConfig) -> Self {
        let mut rng = Rng::from_optional_seed(config.seed);
        let pattern = generate(config.style, config.complexity, config.step_count, &mut rng);
        Sequencer {
            clock: SequencerClock::new(config.bpm, config.swing, pattern.step_count()),
            pattern,
            style: config.style,
            complexity: config.complexity,
            transport: Transport::Stopped,
            lookahead: config.lookahead,
            velocity: config.velocity,
            rng,
            status: Arc::new(TransportStatus::default()),
            on_step: None,
        }
    }

    pub fn status(&self) -> Arc<TransportStatus> {
        Arc::clone(&self.status)
    }

    /// Called with the new current step every time the sequencer advances,
    /// and with 0 on stop.
    pub fn set_step_listener(&mut self, listener: impl FnMut(usize) + Send + 'static) {
        self.on_step = Some(Box::new(listener));
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    pub fn current_step(&self) -> usize {
        self.clock.current_step()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn bpm(&self) -> f64 {
        self.clock.bpm
    }

    pub fn swing(&self) -> f64 {
        self.clock.swing
    }

    pub fn complexity(&self) -> f64 {
        self.complexity
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    pub fn step_duration(&self) -> f64 {
        self.clock.step_duration()
    }

    pub fn start(&mut self, now: f64) {
        if self.is_playing() {
            log::debug!("start ignored: already playing");
            return;
        }
        self.clock.reset(now);
        self.transport = Transport::Playing;
        self.status.publish(true, 0);
        log::info!("sequencer started at {now:.3}s, {} bpm", self.clock.bpm);
    }

    /// Stop, rewind to step 0 and withdraw hits the sink has not started yet.
    pub fn stop(&mut self, now: f64, sink: &mut impl TriggerSink) {
        if !self.is_playing() {
            log::debug!("stop ignored: not playing");
            return;
        }
        self.transport = Transport::Stopped;
        self.clock.reset(now);
        sink.cancel_after(now);
        self.status.publish(false, 0);
        self.notify(0);
        log::info!("sequencer stopped at {now:.3}s");
    }

    /// Fire every step due before `now + lookahead`. Returns the number of
    /// steps fired.
    pub fn tick(&mut self, now: f64, sink: &mut impl TriggerSink) -> usize {
        if !self.is_playing() {
            return 0;
        }
        let horizon = now + self.lookahead;
        let mut fired = 0;
        while self.clock.next_step_time() <= horizon {
            let step = self.clock.current_step();
            let time = self.clock.next_step_time();
            for instrument in self.pattern.active_at(step) {
                sink.trigger_at(TriggerEvent {
                    instrument,
                    velocity: self.velocity,
                    time,
                    step,
                });
            }
            let next = self.clock.advance();
            self.status.publish(true, next);
            self.notify(next);
            fired += 1;
        }
        fired
    }

    fn notify(&mut self, step: usize) {
        if let Some(listener) = self.on_step.as_mut() {
            listener(step);
        }
    }

    /// Clamped to `[60, 200]`; non-finite values are ignored.
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm.is_finite() {
            self.clock.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        }
    }

    /// Clamped to `[0, 100]` percent; non-finite values are ignored.
    pub fn set_swing(&mut self, swing: f64) {
        if swing.is_finite() {
            self.clock.swing = swing.clamp(0.0, MAX_SWING);
        }
    }

    /// Clamped to `[0, 1]`, then the pattern is regenerated.
    pub fn set_complexity(&mut self, complexity: f64) {
        if !complexity.is_finite() {
            return;
        }
        self.complexity = complexity.clamp(0.0, 1.0);
        self.regenerate();
    }

    pub fn set_style(&mut self, style: Style) {
        self.style = style;
        self.regenerate();
    }

    /// Parse a style name; unknown names leave the sequencer unchanged.
    pub fn set_style_name(&mut self, name: &str) -> Result<()> {
        let style = name.parse()?;
        self.set_style(style);
        Ok(())
    }

    pub fn set_velocity(&mut self, velocity: f64) {
        if velocity.is_finite() {
            self.velocity = velocity.clamp(0.0, 1.0);
        }
    }

    /// New pattern from the current style and complexity. Hand edits are lost.
    pub fn regenerate(&mut self) {
        self.pattern = generate(self.style, self.complexity, self.pattern.step_count(), &mut self.rng);
    }

    /// Replace the pattern wholesale, e.g. one loaded from JSON.
    pub fn set_pattern(&mut self, pattern: Pattern) -> Result<()> {
        pattern.validate()?;
        self.clock.set_step_count(pattern.step_count());
        self.pattern = pattern;
        Ok(())
    }

    pub fn toggle_step(&mut self, instrument: Drum, step: usize) -> Result<bool> {
        self.pattern.toggle(instrument, step)
    }

    pub fn clear(&mut self) {
        self.pattern.clear();
    }
}
