//! Offline rendering and WAV encoding.
//!
//! `encode_wav` writes a plain 44-byte-header RIFF file of interleaved
//! 16-bit PCM. The render helpers drive the same [`Engine`] the real-time
//! path uses, ticking the sequencer against the engine's own frame clock.

use super::buffer::AudioBuffer;
use super::context::AudioContext;
use super::effect::{ChainConfig, EffectChain};
use super::engine::{Engine, EngineController};
use super::pluck::{PluckParams, StrumDirection, chord, chord_frequencies, pluck};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::rng::Rng;
use crate::sequencer::{Sequencer, TriggerEvent, TriggerSink};

const HEADER_LEN: usize = 44;

/// Seconds rendered after the last bar so tails can ring out.
pub const TAIL_SECONDS: f64 = 1.0;

#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Encode a buffer as 16-bit PCM WAV bytes.
pub fn encode_wav(buffer: &AudioBuffer) -> Vec<u8> {
    let channels = buffer.num_channels().max(1) as u16;
    let sample_rate = buffer.sample_rate().round() as u32;
    let samples = buffer.to_interleaved();

    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(HEADER_LEN + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in &samples {
        buf.extend_from_slice(&to_i16(sample).to_le_bytes());
    }

    buf
}

/// Passes hits before `end` through and drops the rest, so a render stops
/// cleanly at the bar line.
struct Until<'a> {
    inner: &'a mut EngineController,
    end: f64,
}

impl TriggerSink for Until<'_> {
    fn trigger_at(&mut self, event: TriggerEvent) {
        if event.time < self.end {
            self.inner.trigger_at(event);
        }
    }

    fn cancel_after(&mut self, now: f64) {
        self.inner.cancel_after(now);
    }
}

/// Length of one pass through the pattern, swing included.
pub fn bar_seconds(sequencer: &Sequencer) -> f64 {
    let steps = sequencer.pattern().step_count();
    let d = sequencer.step_duration();
    let odd_steps = steps / 2;
    steps as f64 * d + odd_steps as f64 * d * sequencer.swing() / 100.0 * 0.5
}

/// Play `bars` passes of the sequencer's pattern through a fresh engine.
pub fn render_pattern(config: &EngineConfig, sequencer: &mut Sequencer, bars: usize) -> Result<AudioBuffer> {
    let (mut engine, mut controller) = Engine::new(config)?;
    let ctx = *engine.context();
    let end = bar_seconds(sequencer) * bars.max(1) as f64;
    let total = ctx.frames(end + TAIL_SECONDS);

    let mut out = AudioBuffer::new(2, total, ctx.sample_rate);
    let channels = out.channels_mut();
    let (left, right) = channels.split_at_mut(1);
    let (left, right) = (&mut left[0], &mut right[0]);

    sequencer.start(0.0);
    let mut offset = 0;
    while offset < total {
        let n = (total - offset).min(ctx.block_size);
        let now = ctx.seconds(engine.frame());
        sequencer.tick(now, &mut Until { inner: &mut controller, end });
        engine.process(&mut left[offset..offset + n], &mut right[offset..offset + n]);
        offset += n;
    }
    sequencer.stop(ctx.seconds(engine.frame()), &mut controller);
    log::debug!("rendered {bars} bar(s), {total} frames");
    Ok(out)
}

/// Run a rendered buffer through an effect chain, keeping its length.
pub fn apply_chain(ctx: &AudioContext, buffer: &AudioBuffer, config: &ChainConfig) -> Result<AudioBuffer> {
    let mut chain = EffectChain::from_config(ctx, config)?;
    let frames = buffer.frames();
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for i in 0..frames {
        let (l, r) = buffer.frame_stereo(i);
        left.push(l);
        right.push(r);
    }
    for (l, r) in left.chunks_mut(ctx.block_size).zip(right.chunks_mut(ctx.block_size)) {
        chain.process_block(l, r);
    }
    AudioBuffer::from_channels(vec![left, right], buffer.sample_rate())
}

pub fn render_pluck_wav(sample_rate: u32, params: &PluckParams, seed: u64) -> Result<Vec<u8>> {
    let ctx = AudioContext::new(sample_rate as f64, 128);
    let buffer = pluck(&ctx, params, &mut Rng::new_with_seed(seed))?;
    Ok(encode_wav(&buffer))
}

/// Render a named chord ("Am", "G7", ...) strummed with `strum` seconds
/// between strings.
pub fn render_chord_wav(
    sample_rate: u32,
    name: &str,
    strum: f64,
    direction: StrumDirection,
    template: &PluckParams,
    seed: u64,
) -> Result<Vec<u8>> {
    let ctx = AudioContext::new(sample_rate as f64, 128);
    let frequencies = chord_frequencies(name)?;
    let buffer = chord(&ctx, &frequencies, strum, direction, template, &mut Rng::new_with_seed(seed))?;
    Ok(encode_wav(&buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SequencerConfig;
    use crate::dsp::effect::{EffectConfig, EffectKind};
    use crate::error::SynthError;
    use crate::sequencer::Style;
    use std::io::Cursor;

    fn sequencer(style: Style, swing: f64) -> Sequencer {
        Sequencer::new(&SequencerConfig {
            style,
            swing,
            complexity: 0.0,
            seed: Some(1),
            ..SequencerConfig::default()
        })
        .unwrap()
    }

    fn u16_at(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn header_layout() {
        let buf = AudioBuffer::from_channels(vec![vec![0.0; 10], vec![0.0; 10]], 44100.0).unwrap();
        let wav = encode_wav(&buf);
        assert_eq!(wav.len(), 44 + 10 * 2 * 2);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 4), 36 + 40);
        assert_eq!(u16_at(&wav, 22), 2);
        assert_eq!(u32_at(&wav, 24), 44100);
        assert_eq!(u16_at(&wav, 34), 16);
        assert_eq!(u32_at(&wav, 40), 40);
    }

    #[test]
    fn samples_are_rounded_and_clamped() {
        assert_eq!(to_i16(1.0), 32767);
        assert_eq!(to_i16(-1.0), -32767);
        assert_eq!(to_i16(3.0), 32767);
        assert_eq!(to_i16(0.5), 16384);
        assert_eq!(to_i16(0.0), 0);
    }

    #[test]
    fn wav_round_trip_within_one_step() {
        let data: Vec<f32> = (0..500).map(|i| (i as f32 * 0.05).sin() * 0.9).collect();
        let buf = AudioBuffer::from_mono(data.clone(), 22050.0);
        let mut reader = hound::WavReader::new(Cursor::new(encode_wav(&buf))).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 22050);
        let back: Vec<f32> = reader.samples::<i16>().map(|s| s.unwrap() as f32 / 32767.0).collect();
        assert_eq!(back.len(), 500);
        for (a, b) in data.iter().zip(&back) {
            assert!((a - b).abs() <= 1.0 / 32767.0 + 1e-7, "{a} vs {b}");
        }
    }

    #[test]
    fn hound_reads_our_output() {
        let buf = AudioBuffer::from_channels(vec![vec![0.25; 64], vec![-0.25; 64]], 48000.0).unwrap();
        let wav = encode_wav(&buf);
        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 128);
        assert_eq!(samples[0], to_i16(0.25));
        assert_eq!(samples[1], to_i16(-0.25));
    }

    #[test]
    fn bar_length_includes_swing() {
        assert!((bar_seconds(&sequencer(Style::Rock, 0.0)) - 2.0).abs() < 1e-12);
        // 8 odd steps, each 0.0625 s longer at full swing
        assert!((bar_seconds(&sequencer(Style::Rock, 100.0)) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn pattern_render_places_the_backbeat() {
        let cfg = EngineConfig {
            seed: Some(4),
            ..EngineConfig::default()
        };
        let mut seq = sequencer(Style::Rock, 0.0);
        let out = render_pattern(&cfg, &mut seq, 1).unwrap();
        assert_eq!(out.frames(), AudioContext::default().frames(2.0 + TAIL_SECONDS));
        assert!(!seq.is_playing());
        // kick and hat on frame 0
        assert!(out.channel(0)[..64].iter().any(|&s| s != 0.0));
        // nothing is scheduled past the bar line; the tail dies away
        let last = &out.channel(0)[out.frames() - 2205..];
        assert!(last.iter().all(|s| s.abs() < 0.05));
    }

    #[test]
    fn chain_keeps_length() {
        let ctx = AudioContext::default();
        let buf = AudioBuffer::from_mono(vec![0.5; 1000], ctx.sample_rate);
        let cfg = ChainConfig {
            effects: vec![EffectConfig::new(EffectKind::Distortion), EffectConfig::new(EffectKind::Eq)],
        };
        let out = apply_chain(&ctx, &buf, &cfg).unwrap();
        assert_eq!(out.frames(), 1000);
        assert_eq!(out.num_channels(), 2);
    }

    #[test]
    fn pluck_and_chord_wavs() {
        let pluck = render_pluck_wav(44100, &PluckParams::new(110.0, 0.5), 7).unwrap();
        assert_eq!(pluck.len(), 44 + 22050 * 2);
        let strum = render_chord_wav(44100, "Am", 0.02, StrumDirection::Down, &PluckParams::new(0.0, 0.5), 7)
            .unwrap();
        assert!(strum.len() > pluck.len());
        assert!(matches!(
            render_chord_wav(44100, "Hm", 0.02, StrumDirection::Down, &PluckParams::new(0.0, 0.5), 7),
            Err(SynthError::UnknownChord(_))
        ));
    }
}
