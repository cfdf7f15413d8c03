//! Planar multi-channel sample buffers.
//!
//! A buffer is built once (by synthesis, decoding or extraction) and then
//! shared read-only between voices through an `Arc`.

use crate::error::{Result, SynthError};

/// `channels x frames` f32 samples at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: f64,
}

impl AudioBuffer {
    /// A silent buffer. At least one channel is always allocated.
    pub fn new(num_channels: usize, frames: usize, sample_rate: f64) -> Self {
        AudioBuffer {
            channels: vec![vec![0.0; frames]; num_channels.max(1)],
            sample_rate,
        }
    }

    pub fn from_mono(data: Vec<f32>, sample_rate: f64) -> Self {
        AudioBuffer {
            channels: vec![data],
            sample_rate,
        }
    }

    /// Build from planar channel data; every channel must have the same length.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: f64) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(SynthError::configuration("channels", 0.0, "at least one channel required"));
        };
        let frames = first.len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(SynthError::configuration(
                "channels",
                channels.len() as f64,
                "all channels must have the same length",
            ));
        }
        Ok(AudioBuffer { channels, sample_rate })
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index.min(self.channels.len() - 1)]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let last = self.channels.len() - 1;
        &mut self.channels[index.min(last)]
    }

    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    /// Stereo frame; mono buffers are duplicated to both sides.
    #[inline]
    pub fn frame_stereo(&self, frame: usize) -> (f32, f32) {
        let l = self.channels[0].get(frame).copied().unwrap_or(0.0);
        let r = match self.channels.get(1) {
            Some(ch) => ch.get(frame).copied().unwrap_or(0.0),
            None => l,
        };
        (l, r)
    }

    /// Read a channel with linear interpolation at a fractional position.
    pub fn read_interpolated(&self, channel: usize, position: f64) -> f64 {
        let data = self.channel(channel);
        if data.is_empty() || position < 0.0 {
            return 0.0;
        }
        let idx = position as usize;
        if idx >= data.len() - 1 {
            return if idx < data.len() { data[idx] as f64 } else { 0.0 };
        }
        let frac = position - idx as f64;
        data[idx] as f64 * (1.0 - frac) + data[idx + 1] as f64 * frac
    }

    /// Add `other` into this buffer starting at `offset` frames, scaled by `gain`.
    ///
    /// Samples past the end of `self` are dropped. A mono source is spread to
    /// every destination channel.
    pub fn mix_in(&mut self, other: &AudioBuffer, offset: usize, gain: f32) {
        let frames = self.frames();
        if offset >= frames {
            return;
        }
        let n = other.frames().min(frames - offset);
        for (ch, dst) in self.channels.iter_mut().enumerate() {
            let src = other.channel(ch);
            for (d, s) in dst[offset..offset + n].iter_mut().zip(&src[..n]) {
                *d += s * gain;
            }
        }
    }

    pub fn apply_gain(&mut self, gain: f32) {
        for ch in &mut self.channels {
            for s in ch.iter_mut() {
                *s *= gain;
            }
        }
    }

    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0_f32, |m, &s| m.max(s.abs()))
    }

    pub fn rms(&self) -> f64 {
        let count = self.frames() * self.num_channels();
        if count == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .channels
            .iter()
            .flat_map(|c| c.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum / count as f64).sqrt()
    }

    /// Interleave channels (L R L R ...).
    pub fn to_interleaved(&self) -> Vec<f32> {
        let channels = self.num_channels();
        let mut out = Vec::with_capacity(self.frames() * channels);
        for frame in 0..self.frames() {
            for ch in &self.channels {
                out.push(ch[frame]);
            }
        }
        out
    }

    /// Copy out `[start, end)` seconds as a new buffer.
    ///
    /// Frame bounds are `floor(t * sample_rate)`. The result always has
    /// `end_frame - start_frame` frames; anything past the source is silent.
    pub fn extract(&self, start: f64, end: f64) -> Result<AudioBuffer> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end <= start {
            return Err(SynthError::InvalidRange { start, end });
        }
        let start_frame = (start * self.sample_rate).floor() as usize;
        let end_frame = (end * self.sample_rate).floor() as usize;
        if end_frame <= start_frame {
            return Err(SynthError::InvalidRange { start, end });
        }
        let frame_count = end_frame - start_frame;
        let mut out = AudioBuffer::new(self.num_channels(), frame_count, self.sample_rate);
        let available = self.frames().saturating_sub(start_frame).min(frame_count);
        for (dst, src) in out.channels.iter_mut().zip(&self.channels) {
            dst[..available].copy_from_slice(&src[start_frame..start_frame + available]);
        }
        Ok(out)
    }
}

/// Extract from an optional source, failing with `NotLoaded` when absent.
pub fn extract(source: Option<&AudioBuffer>, start: f64, end: f64) -> Result<AudioBuffer> {
    source.ok_or(SynthError::NotLoaded)?.extract(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, sample_rate: f64) -> AudioBuffer {
        let data: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        AudioBuffer::from_channels(vec![data.clone(), data], sample_rate).unwrap()
    }

    #[test]
    fn extract_copies_floor_frame_range() {
        let buf = ramp(1000, 100.0);
        let out = buf.extract(1.0, 2.5).unwrap();
        assert_eq!(out.frames(), 150);
        assert_eq!(out.num_channels(), 2);
        assert_eq!(out.channel(0)[0], 100.0);
        assert_eq!(out.channel(1)[149], 249.0);
    }

    #[test]
    fn extract_inverted_range_fails() {
        let buf = ramp(1000, 100.0);
        assert_eq!(
            buf.extract(2.0, 1.0).unwrap_err(),
            SynthError::InvalidRange { start: 2.0, end: 1.0 }
        );
        assert!(matches!(buf.extract(1.0, 1.0), Err(SynthError::InvalidRange { .. })));
    }

    #[test]
    fn extract_sub_frame_range_fails() {
        let buf = ramp(1000, 100.0);
        // Both ends floor to frame 100.
        assert!(matches!(buf.extract(1.0, 1.005), Err(SynthError::InvalidRange { .. })));
    }

    #[test]
    fn extract_without_source_is_not_loaded() {
        assert_eq!(extract(None, 0.0, 1.0).unwrap_err(), SynthError::NotLoaded);
    }

    #[test]
    fn extract_past_end_pads_with_silence() {
        let buf = ramp(100, 100.0);
        let out = buf.extract(0.5, 1.5).unwrap();
        assert_eq!(out.frames(), 100);
        assert_eq!(out.channel(0)[49], 99.0);
        assert_eq!(out.channel(0)[50], 0.0);
    }

    #[test]
    fn mono_reads_as_stereo() {
        let buf = AudioBuffer::from_mono(vec![0.25, 0.5], 44100.0);
        assert_eq!(buf.frame_stereo(1), (0.5, 0.5));
        assert_eq!(buf.frame_stereo(5), (0.0, 0.0));
    }

    #[test]
    fn mismatched_channels_rejected() {
        let err = AudioBuffer::from_channels(vec![vec![0.0; 3], vec![0.0; 4]], 44100.0);
        assert!(err.is_err());
    }

    #[test]
    fn mix_in_offsets_and_truncates() {
        let mut dst = AudioBuffer::new(1, 4, 44100.0);
        let src = AudioBuffer::from_mono(vec![1.0, 1.0, 1.0], 44100.0);
        dst.mix_in(&src, 2, 0.5);
        assert_eq!(dst.channel(0), &[0.0, 0.0, 0.5, 0.5]);
    }

    #[test]
    fn interpolated_read() {
        let buf = AudioBuffer::from_mono(vec![0.0, 1.0, 0.0], 44100.0);
        assert!((buf.read_interpolated(0, 0.5) - 0.5).abs() < 1e-9);
        assert_eq!(buf.read_interpolated(0, 10.0), 0.0);
        assert_eq!(buf.read_interpolated(0, -1.0), 0.0);
    }
}
