//! A 300-key soundboard with an automatic player.
//!
//! Keys 0-74 are kicks, 75-149 snares, 150-224 closed hats and 225-299 short
//! sine tones. The auto-player picks keys every `interval_ms` according to
//! its [`AutoMode`] and is driven by `tick(now, sink)` like the sequencer.
//! At short intervals it easily outruns the voice pool, which is how pool
//! eviction gets exercised.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dsp::engine::EngineController;
use crate::dsp::percussion::Drum;
use crate::dsp::voice::VoiceTag;
use crate::error::SynthError;
use crate::rng::Rng;

pub const KEY_COUNT: usize = 300;
const KEYS_PER_DRUM: usize = 75;
const TONE_BASE_HZ: f64 = 65.41;
const TONE_SECONDS: f64 = 0.1;
/// How long a key counts as lit after a hit.
const ACTIVE_SECONDS: f64 = 0.1;
const MAJOR_SCALE: [usize; 7] = [0, 2, 4, 5, 7, 9, 11];

pub const MIN_INTERVAL_MS: f64 = 10.0;
pub const MAX_INTERVAL_MS: f64 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeySound {
    Drum(Drum),
    /// Sine blip at this frequency.
    Tone(f64),
}

/// What key `index` plays, or `None` past the last key.
pub fn key_sound(index: usize) -> Option<KeySound> {
    let sound = match index / KEYS_PER_DRUM {
        0 => KeySound::Drum(Drum::Kick),
        1 => KeySound::Drum(Drum::Snare),
        2 => KeySound::Drum(Drum::ClosedHat),
        3 => KeySound::Tone(TONE_BASE_HZ * 2.0_f64.powf((index % 60) as f64 / 12.0)),
        _ => return None,
    };
    Some(sound)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoMode {
    /// One to three keys anywhere.
    #[default]
    Random,
    /// Three adjacent keys.
    Sequence,
    /// Kick, snare and hat keys, each with its own probability.
    Rhythm,
    /// One tone from a major scale.
    Melody,
}

impl AutoMode {
    pub const ALL: [AutoMode; 4] = [AutoMode::Random, AutoMode::Sequence, AutoMode::Rhythm, AutoMode::Melody];

    pub fn name(self) -> &'static str {
        match self {
            AutoMode::Random => "random",
            AutoMode::Sequence => "sequence",
            AutoMode::Rhythm => "rhythm",
            AutoMode::Melody => "melody",
        }
    }
}

impl fmt::Display for AutoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AutoMode {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        AutoMode::ALL
            .into_iter()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| SynthError::Config(format!("unknown soundboard mode '{s}'")))
    }
}

/// One key press.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KeyHit {
    pub key: usize,
    pub velocity: f64,
    pub time: f64,
}

pub trait KeySink {
    fn key_at(&mut self, hit: KeyHit);
}

impl KeySink for Vec<KeyHit> {
    fn key_at(&mut self, hit: KeyHit) {
        self.push(hit);
    }
}

impl KeySink for EngineController {
    fn key_at(&mut self, hit: KeyHit) {
        let frame = (hit.time.max(0.0) * self.context().sample_rate).round() as u64;
        match key_sound(hit.key) {
            Some(KeySound::Drum(drum)) => {
                self.trigger_at_frame(drum, hit.velocity, frame, VoiceTag::Soundboard);
            }
            Some(KeySound::Tone(frequency)) => {
                self.blip_at_frame(frequency, TONE_SECONDS, hit.velocity, frame, VoiceTag::Soundboard);
            }
            None => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoundboardStatus {
    pub enabled: bool,
    pub interval_ms: f64,
    pub mode: AutoMode,
}

#[derive(Debug)]
pub struct Soundboard {
    mode: AutoMode,
    interval_ms: f64,
    enabled: bool,
    next_time: f64,
    volume: f64,
    rng: Rng,
    lit: Vec<(usize, f64)>,
}

impl Default for Soundboard {
    fn default() -> Self {
        Soundboard::new(None)
    }
}

impl Soundboard {
    pub fn new(seed: Option<u64>) -> Self {
        Soundboard {
            mode: AutoMode::Random,
            interval_ms: 100.0,
            enabled: false,
            next_time: 0.0,
            volume: 0.6,
            rng: Rng::from_optional_seed(seed),
            lit: Vec::new(),
        }
    }

    pub fn status(&self) -> SoundboardStatus {
        SoundboardStatus {
            enabled: self.enabled,
            interval_ms: self.interval_ms,
            mode: self.mode,
        }
    }

    pub fn mode(&self) -> AutoMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AutoMode) {
        self.mode = mode;
    }

    /// Unknown names leave the mode unchanged.
    pub fn set_mode_name(&mut self, name: &str) -> Result<(), SynthError> {
        self.mode = name.parse()?;
        Ok(())
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Clamped to `[10, 2000]` ms.
    pub fn set_interval_ms(&mut self, ms: f64) {
        if ms.is_finite() {
            self.interval_ms = ms.clamp(MIN_INTERVAL_MS, MAX_INTERVAL_MS);
        }
    }

    /// Scales every hit's velocity.
    pub fn set_volume(&mut self, volume: f64) {
        if volume.is_finite() {
            self.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn is_running(&self) -> bool {
        self.enabled
    }

    pub fn start(&mut self, now: f64) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        self.next_time = now;
        log::debug!("auto-player started in {} mode every {} ms", self.mode, self.interval_ms);
    }

    pub fn stop(&mut self) {
        self.enabled = false;
    }

    /// Press one key now. Out-of-range keys are ignored.
    pub fn play_key(&mut self, key: usize, velocity: f64, now: f64, sink: &mut impl KeySink) -> bool {
        if key >= KEY_COUNT {
            return false;
        }
        sink.key_at(KeyHit {
            key,
            velocity: (velocity * self.volume).clamp(0.0, 1.0),
            time: now,
        });
        self.lit.push((key, now + ACTIVE_SECONDS));
        true
    }

    pub fn play_keys(&mut self, keys: &[usize], velocity: f64, now: f64, sink: &mut impl KeySink) -> usize {
        keys.iter()
            .filter(|&&key| self.play_key(key, velocity, now, sink))
            .count()
    }

    /// Keys hit less than 100 ms before `now`.
    pub fn active_keys(&self, now: f64) -> Vec<usize> {
        self.lit
            .iter()
            .filter(|&&(_, until)| until > now)
            .map(|&(key, _)| key)
            .collect()
    }

    /// Pick the keys for one round of the auto-player.
    pub fn select_keys(&mut self) -> Vec<usize> {
        let rng = &mut self.rng;
        match self.mode {
            AutoMode::Random => {
                let count = (rng.rand_float() * 3.0) as usize + 1;
                (0..count).map(|_| rng.rand_range(0..KEY_COUNT)).collect()
            }
            AutoMode::Sequence => {
                let start = rng.rand_range(0..KEY_COUNT - 10);
                (start..start + 3).collect()
            }
            AutoMode::Rhythm => {
                let mut keys = Vec::with_capacity(3);
                for (base, threshold) in [(0, 0.5), (KEYS_PER_DRUM, 0.3), (2 * KEYS_PER_DRUM, 0.2)] {
                    if rng.rand_float() > threshold {
                        keys.push(base + rng.rand_range(0..KEYS_PER_DRUM));
                    }
                }
                keys
            }
            AutoMode::Melody => {
                let root = 3 * KEYS_PER_DRUM + rng.rand_range(0..12);
                vec![root + MAJOR_SCALE[rng.rand_range(0..MAJOR_SCALE.len())]]
            }
        }
    }

    /// Run every auto-player round due by `now`. Returns the number of keys hit.
    pub fn tick(&mut self, now: f64, sink: &mut impl KeySink) -> usize {
        self.lit.retain(|&(_, until)| until > now);
        if !self.enabled {
            return 0;
        }
        let interval = self.interval_ms / 1000.0;
        if now - self.next_time > 1.0 {
            log::debug!("auto-player fell {:.2}s behind, skipping ahead", now - self.next_time);
            self.next_time = now;
        }
        let mut hits = 0;
        while self.next_time <= now {
            let time = self.next_time;
            for key in self.select_keys() {
                let velocity = self.rng.rand_float() * 0.5 + 0.5;
                if self.play_key(key, velocity, time, sink) {
                    hits += 1;
                }
            }
            self.next_time += interval;
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, OverflowPolicy};
    use crate::dsp::engine::Engine;

    #[test]
    fn key_layout() {
        assert_eq!(key_sound(0), Some(KeySound::Drum(Drum::Kick)));
        assert_eq!(key_sound(74), Some(KeySound::Drum(Drum::Kick)));
        assert_eq!(key_sound(75), Some(KeySound::Drum(Drum::Snare)));
        assert_eq!(key_sound(224), Some(KeySound::Drum(Drum::ClosedHat)));
        assert_eq!(key_sound(300), None);
        // 240 % 60 == 0
        assert_eq!(key_sound(240), Some(KeySound::Tone(65.41)));
        let Some(KeySound::Tone(f)) = key_sound(252) else {
            panic!("key 252 should be a tone");
        };
        assert!((f - 130.82).abs() < 1e-9);
    }

    #[test]
    fn interval_is_clamped() {
        let mut sb = Soundboard::new(Some(1));
        sb.set_interval_ms(1.0);
        assert_eq!(sb.interval_ms(), 10.0);
        sb.set_interval_ms(5000.0);
        assert_eq!(sb.interval_ms(), 2000.0);
    }

    #[test]
    fn unknown_mode_is_ignored() {
        let mut sb = Soundboard::new(Some(1));
        sb.set_mode(AutoMode::Rhythm);
        assert!(sb.set_mode_name("chaos").is_err());
        assert_eq!(sb.mode(), AutoMode::Rhythm);
        sb.set_mode_name("Melody").unwrap();
        assert_eq!(sb.mode(), AutoMode::Melody);
    }

    #[test]
    fn modes_pick_keys_in_their_ranges() {
        let mut sb = Soundboard::new(Some(9));
        for _ in 0..200 {
            sb.set_mode(AutoMode::Random);
            let keys = sb.select_keys();
            assert!((1..=3).contains(&keys.len()) && keys.iter().all(|&k| k < KEY_COUNT));

            sb.set_mode(AutoMode::Sequence);
            let keys = sb.select_keys();
            assert_eq!(keys.len(), 3);
            assert_eq!(keys[1], keys[0] + 1);
            assert!(keys[2] < KEY_COUNT);

            sb.set_mode(AutoMode::Rhythm);
            for key in sb.select_keys() {
                assert!(matches!(key_sound(key), Some(KeySound::Drum(_))));
            }

            sb.set_mode(AutoMode::Melody);
            let keys = sb.select_keys();
            assert_eq!(keys.len(), 1);
            assert!((225..225 + 12 + 11).contains(&keys[0]));
        }
    }

    #[test]
    fn tick_fires_once_per_interval() {
        let mut sb = Soundboard::new(Some(4));
        sb.set_mode(AutoMode::Melody);
        sb.set_interval_ms(100.0);
        let mut hits = Vec::new();
        assert_eq!(sb.tick(0.0, &mut hits), 0);
        sb.start(0.0);
        sb.tick(0.0, &mut hits);
        sb.tick(0.35, &mut hits);
        // rounds at 0.0, 0.1, 0.2, 0.3
        assert_eq!(hits.len(), 4);
        assert!(hits.iter().all(|h| (0.3..=0.6).contains(&h.velocity)));
        sb.stop();
        assert_eq!(sb.tick(1.0, &mut hits), 0);
    }

    #[test]
    fn lit_keys_expire() {
        let mut sb = Soundboard::new(Some(4));
        let mut hits = Vec::new();
        assert!(sb.play_key(10, 1.0, 0.0, &mut hits));
        assert!(!sb.play_key(300, 1.0, 0.0, &mut hits));
        assert_eq!(sb.active_keys(0.05), vec![10]);
        assert!(sb.active_keys(0.2).is_empty());
    }

    #[test]
    fn rapid_play_evicts_oldest_voices() {
        let cfg = EngineConfig {
            max_voices: 8,
            overflow: OverflowPolicy::StealOldest,
            seed: Some(5),
            ..EngineConfig::default()
        };
        let (mut engine, mut ctl) = Engine::new(&cfg).unwrap();
        let mut sb = Soundboard::new(Some(5));
        sb.set_interval_ms(10.0);
        sb.start(0.0);
        let mut total = 0;
        for block in 0..40 {
            total += sb.tick(block as f64 * 0.01, &mut ctl);
            let out = engine.render_offline(441);
            assert!(out.channel(0).iter().all(|s| s.abs() <= 1.0));
        }
        assert!(total > 8);
        assert!(engine.active_voices() <= 8);
        assert!(engine.status().dropped_voices() > 0);
    }
}
