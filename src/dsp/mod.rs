//! DSP: synthesis, effects and the real-time engine.
//!
//! Everything here takes an explicit [`context::AudioContext`] and renders
//! into pre-sized buffers. The same code backs the offline WAV renderer and
//! the block-based [`engine::Engine`].

pub mod buffer;
pub mod context;
pub mod delay_line;
pub mod envelope;
pub mod filter;
pub mod mixer;
pub mod noise;
pub mod note;
pub mod oscillator;

pub mod percussion;
pub mod pluck;
pub mod voice;

pub mod chorus;
pub mod compressor;
pub mod delay;
pub mod distortion;
pub mod effect;
pub mod eq;
pub mod phaser;
pub mod quantizer;
pub mod reverb;
pub mod tremolo;

pub mod engine;
pub mod renderer;
