//! Drum pattern generation and step sequencing.
//!
//! The sequencer never talks to a timer or an audio device directly. It is
//! driven by `tick(now, sink)` calls from whatever owns the clock, and
//! hands each due hit to a [`TriggerSink`] stamped with its exact start
//! time. The engine's controller is one such sink; a `Vec<TriggerEvent>`
//! is another, which is what the tests use.

pub mod clock;
pub mod driver;
pub mod generator;
pub mod pattern;
pub mod transport;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dsp::percussion::Drum;
use crate::error::SynthError;

pub use clock::{AudioClock, ClockSource, ManualClock, SequencerClock, WallClock};
pub use driver::TimerDriver;
pub use generator::generate;
pub use pattern::Pattern;
pub use transport::{Sequencer, Transport, TransportStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Rock,
    Electronic,
    Jazz,
    Funk,
}

impl Style {
    pub const ALL: [Style; 4] = [Style::Rock, Style::Electronic, Style::Jazz, Style::Funk];

    pub fn name(self) -> &'static str {
        match self {
            Style::Rock => "rock",
            Style::Electronic => "electronic",
            Style::Jazz => "jazz",
            Style::Funk => "funk",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Style {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Style::ALL
            .into_iter()
            .find(|style| style.name() == wanted)
            .ok_or_else(|| SynthError::UnknownStyle(s.to_string()))
    }
}

/// One scheduled drum hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TriggerEvent {
    pub instrument: Drum,
    pub velocity: f64,
    /// Start time in seconds on the sequencer's clock.
    pub time: f64,
    pub step: usize,
}

/// Receiver of scheduled hits.
pub trait TriggerSink {
    fn trigger_at(&mut self, event: TriggerEvent);

    /// Withdraw every hit scheduled after `now` that has not started yet.
    fn cancel_after(&mut self, now: f64);
}

impl TriggerSink for Vec<TriggerEvent> {
    fn trigger_at(&mut self, event: TriggerEvent) {
        self.push(event);
    }

    fn cancel_after(&mut self, now: f64) {
        self.retain(|e| e.time <= now);
    }
}
