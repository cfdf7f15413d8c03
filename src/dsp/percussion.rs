//! Procedural drums.
//!
//! Every drum is a fixed recipe of at most [`MAX_LAYERS`] layers. A layer is
//! a tone (oscillator with a pitch envelope) or a view into the kit's shared
//! noise buffer, optionally filtered, shaped by an amplitude envelope and
//! started at a fixed offset. Recipes are built once per [`DrumKit`];
//! triggering a hit only copies small per-layer state.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::buffer::AudioBuffer;
use super::context::AudioContext;
use super::envelope::{Envelope, EnvelopeCursor};
use super::filter::{BiquadFilter, FilterType};
use super::noise::{NoiseView, white_noise};
use super::oscillator::{Oscillator, Waveform};
use crate::error::SynthError;
use crate::rng::Rng;

pub const MAX_LAYERS: usize = 4;

/// Frames between the noise start positions of consecutive hits.
const NOISE_STRIDE: usize = 7919;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Drum {
    Kick,
    SubKick,
    Snare,
    #[serde(rename = "hihat")]
    ClosedHat,
    #[serde(rename = "openhat")]
    OpenHat,
    LowTom,
    MidTom,
    HighTom,
    Cymbal,
    Clap,
    Rimshot,
}

impl Drum {
    pub const ALL: [Drum; 11] = [
        Drum::Kick,
        Drum::SubKick,
        Drum::Snare,
        Drum::ClosedHat,
        Drum::OpenHat,
        Drum::LowTom,
        Drum::MidTom,
        Drum::HighTom,
        Drum::Cymbal,
        Drum::Clap,
        Drum::Rimshot,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Drum::Kick => "kick",
            Drum::SubKick => "sub_kick",
            Drum::Snare => "snare",
            Drum::ClosedHat => "hihat",
            Drum::OpenHat => "openhat",
            Drum::LowTom => "low_tom",
            Drum::MidTom => "mid_tom",
            Drum::HighTom => "high_tom",
            Drum::Cymbal => "cymbal",
            Drum::Clap => "clap",
            Drum::Rimshot => "rimshot",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Drum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Drum {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let drum = match s.trim().to_ascii_lowercase().as_str() {
            "kick" | "bd" => Drum::Kick,
            "sub_kick" | "subkick" => Drum::SubKick,
            "snare" | "sd" => Drum::Snare,
            "hihat" | "hat" | "closed_hat" | "ch" => Drum::ClosedHat,
            "openhat" | "open_hat" | "oh" => Drum::OpenHat,
            "low_tom" | "tom" => Drum::LowTom,
            "mid_tom" => Drum::MidTom,
            "high_tom" => Drum::HighTom,
            "cymbal" | "crash" => Drum::Cymbal,
            "clap" => Drum::Clap,
            "rimshot" | "rim" => Drum::Rimshot,
            _ => return Err(SynthError::UnknownInstrument(s.to_string())),
        };
        Ok(drum)
    }
}

#[derive(Debug, Clone)]
enum Source {
    /// Oscillator whose frequency follows `pitch` (in Hz).
    Tone { waveform: Waveform, pitch: Envelope },
    Noise,
}

#[derive(Debug, Clone)]
struct Layer {
    source: Source,
    filter: Option<(FilterType, f64, f64)>,
    amp: Envelope,
    offset: f64,
}

impl Layer {
    fn tone(waveform: Waveform, pitch: Envelope, amp: Envelope) -> Self {
        Layer {
            source: Source::Tone { waveform, pitch },
            filter: None,
            amp,
            offset: 0.0,
        }
    }

    fn noise(filter_type: FilterType, cutoff: f64, q: f64, amp: Envelope) -> Self {
        Layer {
            source: Source::Noise,
            filter: Some((filter_type, cutoff, q)),
            amp,
            offset: 0.0,
        }
    }

    fn at(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    fn end_time(&self) -> f64 {
        let pitch_end = match &self.source {
            Source::Tone { pitch, .. } => pitch.end_time(),
            Source::Noise => 0.0,
        };
        self.offset + self.amp.end_time().max(pitch_end)
    }
}

/// The layers that make up one drum.
#[derive(Debug, Clone)]
pub struct DrumRecipe {
    drum: Drum,
    layers: Vec<Layer>,
    length: f64,
}

impl DrumRecipe {
    fn new(drum: Drum, layers: Vec<Layer>) -> Self {
        debug_assert!(layers.len() <= MAX_LAYERS);
        let length = layers.iter().map(Layer::end_time).fold(0.0, f64::max);
        DrumRecipe { drum, layers, length }
    }

    pub fn drum(&self) -> Drum {
        self.drum
    }

    /// Seconds until the last layer has decayed.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    fn build(drum: Drum) -> Self {
        use Waveform::{Sine, Triangle};
        let kick_body = || {
            Layer::tone(
                Sine,
                Envelope::starting_at(150.0).exp_to(40.0, 0.1),
                Envelope::percussive(0.9, 0.4),
            )
        };
        let kick_click = || Layer::noise(FilterType::Highpass, 3000.0, 0.707, Envelope::percussive(0.9, 0.02));
        let tom = |freq: f64, decay: f64| {
            vec![
                Layer::tone(
                    Sine,
                    Envelope::starting_at(freq * 1.4).exp_to(freq, 0.12),
                    Envelope::percussive(0.8, decay),
                ),
                Layer::noise(FilterType::Bandpass, freq * 4.0, 1.0, Envelope::percussive(0.15, 0.05)),
            ]
        };

        let layers = match drum {
            Drum::Kick => vec![kick_body(), kick_click()],
            Drum::SubKick => vec![
                kick_body(),
                kick_click(),
                Layer::tone(Sine, Envelope::constant(50.0), Envelope::percussive(0.6, 0.5)),
            ],
            Drum::Snare => vec![
                Layer::tone(Triangle, Envelope::constant(185.0), Envelope::percussive(0.5, 0.15)),
                Layer::noise(FilterType::Highpass, 1000.0, 0.707, Envelope::percussive(0.7, 0.2)),
            ],
            Drum::ClosedHat => vec![Layer::noise(FilterType::Highpass, 7000.0, 0.707, Envelope::percussive(0.5, 0.05))],
            Drum::OpenHat => vec![Layer::noise(FilterType::Highpass, 7000.0, 0.707, Envelope::percussive(0.5, 0.3))],
            Drum::LowTom => tom(100.0, 0.4),
            Drum::MidTom => tom(150.0, 0.3),
            Drum::HighTom => tom(200.0, 0.25),
            Drum::Cymbal => vec![
                Layer::noise(FilterType::Highpass, 5000.0, 0.707, Envelope::percussive(0.4, 1.2)),
                Layer::noise(FilterType::Bandpass, 8000.0, 2.0, Envelope::percussive(0.3, 0.6)),
            ],
            Drum::Clap => {
                let burst = || Layer::noise(FilterType::Bandpass, 1200.0, 1.5, Envelope::percussive(0.7, 0.01));
                vec![
                    burst(),
                    burst().at(0.01),
                    burst().at(0.02),
                    Layer::noise(FilterType::Bandpass, 1200.0, 1.5, Envelope::percussive(0.4, 0.15)).at(0.03),
                ]
            }
            Drum::Rimshot => vec![
                Layer::tone(Triangle, Envelope::constant(400.0), Envelope::percussive(0.5, 0.03)),
                Layer::noise(FilterType::Bandpass, 1700.0, 3.0, Envelope::percussive(0.6, 0.025)),
            ],
        };
        DrumRecipe::new(drum, layers)
    }
}

#[derive(Debug, Clone)]
struct LayerState {
    osc: Oscillator,
    noise: NoiseView,
    filter: Option<BiquadFilter>,
    pitch: EnvelopeCursor,
    amp: EnvelopeCursor,
    start_frame: u64,
}

/// One playing hit. Streams the recipe without allocating.
#[derive(Debug, Clone)]
pub struct DrumVoice {
    recipe: Arc<DrumRecipe>,
    layers: [Option<LayerState>; MAX_LAYERS],
    velocity: f64,
    frame: u64,
    total_frames: u64,
}

impl DrumVoice {
    fn new(ctx: &AudioContext, recipe: Arc<DrumRecipe>, noise: &Arc<AudioBuffer>, noise_offset: usize, velocity: f64) -> Self {
        let layers = std::array::from_fn(|i| {
            recipe.layers.get(i).map(|layer| {
                let mut osc = Oscillator::new(Waveform::Sine, ctx.sample_rate);
                if let Source::Tone { waveform, .. } = &layer.source {
                    osc.waveform = *waveform;
                }
                LayerState {
                    osc,
                    noise: NoiseView::new(Arc::clone(noise), noise_offset + i * NOISE_STRIDE),
                    filter: layer
                        .filter
                        .map(|(kind, freq, q)| BiquadFilter::with_params(kind, ctx, freq, q, 0.0)),
                    pitch: EnvelopeCursor::new(ctx.sample_rate),
                    amp: EnvelopeCursor::new(ctx.sample_rate),
                    start_frame: ctx.frames(layer.offset) as u64,
                }
            })
        });
        let total_frames = ctx.frames(recipe.length) as u64 + 1;
        DrumVoice {
            recipe,
            layers,
            velocity: velocity.clamp(0.0, 1.0),
            frame: 0,
            total_frames,
        }
    }

    pub fn drum(&self) -> Drum {
        self.recipe.drum
    }

    pub fn is_finished(&self) -> bool {
        self.frame >= self.total_frames
    }

    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        if self.is_finished() {
            return 0.0;
        }
        let mut out = 0.0;
        for (state, layer) in self.layers.iter_mut().zip(&self.recipe.layers) {
            let Some(state) = state else { continue };
            if self.frame < state.start_frame || state.amp.is_finished(&layer.amp) {
                continue;
            }
            let raw = match &layer.source {
                Source::Tone { pitch, .. } => {
                    state.osc.frequency = state.pitch.next(pitch);
                    state.osc.next_sample()
                }
                Source::Noise => state.noise.next_sample(),
            };
            let shaped = match state.filter.as_mut() {
                Some(f) => f.process(raw),
                None => raw,
            };
            out += shaped * state.amp.next(&layer.amp);
        }
        self.frame += 1;
        out * self.velocity
    }
}

/// Drum recipes plus the shared noise buffer they read from.
#[derive(Debug, Clone)]
pub struct DrumKit {
    ctx: AudioContext,
    noise: Arc<AudioBuffer>,
    recipes: Vec<Arc<DrumRecipe>>,
    hits: usize,
}

impl DrumKit {
    /// Build every recipe and pre-generate `noise_seconds` of noise.
    pub fn new(ctx: &AudioContext, noise_seconds: f64, rng: &mut Rng) -> Self {
        let noise = white_noise(ctx, ctx.frames(noise_seconds.max(2.0)), rng);
        Self::with_noise(ctx, Arc::new(noise))
    }

    pub fn with_noise(ctx: &AudioContext, noise: Arc<AudioBuffer>) -> Self {
        let recipes = Drum::ALL.iter().map(|&d| Arc::new(DrumRecipe::build(d))).collect();
        DrumKit {
            ctx: *ctx,
            noise,
            recipes,
            hits: 0,
        }
    }

    pub fn noise(&self) -> &Arc<AudioBuffer> {
        &self.noise
    }

    pub fn recipe(&self, drum: Drum) -> &DrumRecipe {
        &self.recipes[drum.index()]
    }

    /// Start a hit. Successive hits read the noise from different offsets.
    pub fn voice(&mut self, drum: Drum, velocity: f64) -> DrumVoice {
        let offset = self.hits.wrapping_mul(NOISE_STRIDE) % self.noise.frames().max(1);
        self.hits = self.hits.wrapping_add(1);
        let recipe = Arc::clone(&self.recipes[drum.index()]);
        DrumVoice::new(&self.ctx, recipe, &self.noise, offset, velocity)
    }

    /// Render a whole hit offline as a mono buffer.
    pub fn render(&mut self, drum: Drum, velocity: f64) -> AudioBuffer {
        let mut voice = self.voice(drum, velocity);
        let frames = voice.total_frames as usize;
        let data = (0..frames).map(|_| voice.next_sample() as f32).collect();
        AudioBuffer::from_mono(data, self.ctx.sample_rate)
    }
}
