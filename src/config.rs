//! Engine and sequencer configuration.
//!
//! Both structs deserialize from JSON with every field optional; missing
//! fields take their defaults. Values loaded this way are validated
//! strictly: an out-of-range field is a [`SynthError::Configuration`],
//! unlike the runtime setters which clamp.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dsp::context::AudioContext;
use crate::error::{Result, SynthError, check_range};
use crate::sequencer::Style;

/// What the voice pool does when every slot is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the voice that started earliest.
    #[default]
    StealOldest,
    /// Ignore the new trigger.
    DropNew,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Frames rendered per call on the real-time path.
    pub block_size: usize,
    pub max_voices: usize,
    pub overflow: OverflowPolicy,
    /// Length of the shared percussion noise buffer.
    pub noise_seconds: f64,
    pub master_gain: f64,
    /// Bound of the control -> render command queue.
    pub command_capacity: usize,
    /// Fixed seed for the engine's random source; clock-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100,
            block_size: 128,
            max_voices: 64,
            overflow: OverflowPolicy::StealOldest,
            noise_seconds: 2.0,
            master_gain: 0.8,
            command_capacity: 1024,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| SynthError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_range("sample_rate", self.sample_rate as f64, 8000.0, 192_000.0)?;
        check_range("block_size", self.block_size as f64, 1.0, 8192.0)?;
        check_range("max_voices", self.max_voices as f64, 1.0, 1024.0)?;
        check_range("noise_seconds", self.noise_seconds, 2.0, 30.0)?;
        check_range("master_gain", self.master_gain, 0.0, 4.0)?;
        check_range("command_capacity", self.command_capacity as f64, 1.0, 65536.0)?;
        Ok(())
    }

    pub fn context(&self) -> AudioContext {
        AudioContext::new(self.sample_rate as f64, self.block_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub style: Style,
    pub bpm: f64,
    /// Percent, 0 to 100.
    pub swing: f64,
    pub complexity: f64,
    pub step_count: usize,
    /// How far ahead of the clock steps are scheduled, in seconds.
    pub lookahead: f64,
    /// Period of the timer that drives `tick`.
    pub tick_interval_ms: u64,
    pub velocity: f64,
    pub seed: Option<u64>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        SequencerConfig {
            style: Style::Rock,
            bpm: 120.0,
            swing: 0.0,
            complexity: 0.5,
            step_count: 16,
            lookahead: 0.1,
            tick_interval_ms: 25,
            velocity: 1.0,
            seed: None,
        }
    }
}

impl SequencerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SequencerConfig =
            serde_json::from_str(json).map_err(|e| SynthError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        check_range("bpm", self.bpm, 60.0, 200.0)?;
        check_range("swing", self.swing, 0.0, 100.0)?;
        check_range("complexity", self.complexity, 0.0, 1.0)?;
        check_range("step_count", self.step_count as f64, 1.0, 64.0)?;
        check_range("lookahead", self.lookahead, 0.0, 2.0)?;
        check_range("tick_interval_ms", self.tick_interval_ms as f64, 1.0, 1000.0)?;
        check_range("velocity", self.velocity, 0.0, 1.0)?;
        // The tick period must fit inside the look-ahead window or steps arrive late.
        if self.tick_interval_ms as f64 / 1000.0 > self.lookahead {
            return Err(SynthError::configuration(
                "tick_interval_ms",
                self.tick_interval_ms as f64,
                "tick interval must not exceed the look-ahead window",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(SequencerConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = EngineConfig::from_json(r#"{ "sample_rate": 48000, "overflow": "drop_new" }"#)
            .expect("valid config");
        assert_eq!(cfg.sample_rate, 48000);
        assert_eq!(cfg.overflow, OverflowPolicy::DropNew);
        assert_eq!(cfg.block_size, 128);
    }

    #[test]
    fn out_of_range_rejected() {
        let err = EngineConfig::from_json(r#"{ "noise_seconds": 0.5 }"#).unwrap_err();
        assert!(matches!(err, SynthError::Configuration { ref param, .. } if param == "noise_seconds"));

        let err = SequencerConfig::from_json(r#"{ "bpm": 250 }"#).unwrap_err();
        assert!(matches!(err, SynthError::Configuration { ref param, .. } if param == "bpm"));
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = EngineConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, SynthError::Config(_)));
    }

    #[test]
    fn tick_must_fit_lookahead() {
        let cfg = SequencerConfig {
            lookahead: 0.01,
            tick_interval_ms: 50,
            ..SequencerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tick_interval_reads_milliseconds() {
        let cfg = SequencerConfig::from_json(r#"{ "tick_interval_ms": 10 }"#).expect("valid");
        assert_eq!(cfg.tick_interval(), Duration::from_millis(10));
    }

    #[test]
    fn style_parses_from_json() {
        let cfg = SequencerConfig::from_json(r#"{ "style": "funk", "swing": 40 }"#).expect("valid");
        assert_eq!(cfg.style, Style::Funk);
        assert_eq!(cfg.swing, 40.0);
    }
}
