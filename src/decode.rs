//! Decoding audio files into buffers (`decode` feature).
//!
//! WAV goes through `hound` (integer or float samples, any bit depth it
//! supports); anything else is tried as MP3 through `minimp3`.

use std::io::Cursor;

use crate::dsp::buffer::AudioBuffer;
use crate::error::{Result, SynthError};

pub fn decode_audio(bytes: &[u8]) -> Result<AudioBuffer> {
    if bytes.starts_with(b"RIFF") {
        decode_wav_file(bytes)
    } else {
        decode_mp3(bytes)
    }
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let frames = samples.len() / channels;
    (0..channels)
        .map(|ch| (0..frames).map(|f| samples[f * channels + ch]).collect())
        .collect()
}

fn decode_wav_file(bytes: &[u8]) -> Result<AudioBuffer> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).map_err(|e| SynthError::Wav(e.to_string()))?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| SynthError::Wav(e.to_string()))?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| SynthError::Wav(e.to_string()))?
        }
    };
    AudioBuffer::from_channels(deinterleave(&samples, spec.channels as usize), spec.sample_rate as f64)
}

fn decode_mp3(bytes: &[u8]) -> Result<AudioBuffer> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut format: Option<(usize, i32)> = None;
    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                format.get_or_insert((frame.channels, frame.sample_rate));
                samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::SkippedData) => continue,
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(SynthError::Wav(format!("mp3 decode failed: {e:?}"))),
        }
    }
    let (channels, rate) = format.ok_or_else(|| SynthError::Wav("no audio frames found".into()))?;
    log::debug!("decoded mp3: {channels} channel(s) at {rate} Hz");
    AudioBuffer::from_channels(deinterleave(&samples, channels), rate as f64)
}
