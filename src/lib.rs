pub mod config;
#[cfg(feature = "decode")]
pub mod decode;
pub mod dsp;
pub mod error;
pub mod rng;
pub mod sample_bank;
pub mod sequencer;
pub mod soundboard;

use std::fmt::Display;

use wasm_bindgen::prelude::*;

use crate::config::{EngineConfig, SequencerConfig};
use crate::dsp::pluck::{PluckParams, StrumDirection};
use crate::rng::Rng;
use crate::sequencer::{Sequencer, Style};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn js_error(e: impl Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// WASM-exposed: return the beatforge-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: generate a drum pattern as `{ step_count, rows }`.
#[wasm_bindgen]
pub fn generate_pattern(style: &str, complexity: f64, step_count: usize, seed: u32) -> Result<JsValue, JsValue> {
    let style: Style = style.parse().map_err(js_error)?;
    let pattern = sequencer::generate(style, complexity, step_count, &mut Rng::new_with_seed(seed as u64));
    serde_wasm_bindgen::to_value(&pattern).map_err(js_error)
}

/// WASM-exposed: render `bars` passes of a generated pattern to WAV bytes.
///
/// `sequencer_json` is a (possibly empty) `SequencerConfig` object; its
/// seed is replaced by `seed`.
#[wasm_bindgen]
pub fn render_pattern_wav(sequencer_json: &str, bars: u32, sample_rate: u32, seed: u32) -> Result<Vec<u8>, JsValue> {
    let json = if sequencer_json.trim().is_empty() { "{}" } else { sequencer_json };
    let mut seq_config = SequencerConfig::from_json(json).map_err(js_error)?;
    seq_config.seed = Some(seed as u64);
    let engine_config = EngineConfig {
        sample_rate,
        seed: Some(seed as u64),
        ..EngineConfig::default()
    };
    let mut sequencer = Sequencer::new(&seq_config).map_err(js_error)?;
    let buffer = dsp::renderer::render_pattern(&engine_config, &mut sequencer, bars as usize).map_err(js_error)?;
    Ok(dsp::renderer::encode_wav(&buffer))
}

/// WASM-exposed: one plucked note as WAV bytes.
#[wasm_bindgen]
pub fn render_pluck_wav(frequency: f64, duration: f64, sample_rate: u32, seed: u32) -> Result<Vec<u8>, JsValue> {
    let params = PluckParams::new(frequency, duration);
    dsp::renderer::render_pluck_wav(sample_rate, &params, seed as u64).map_err(js_error)
}

/// WASM-exposed: a strummed chord ("Am", "G7", ...) as WAV bytes.
#[wasm_bindgen]
pub fn render_chord_wav(
    chord: &str,
    strum: f64,
    upstroke: bool,
    duration: f64,
    sample_rate: u32,
    seed: u32,
) -> Result<Vec<u8>, JsValue> {
    let direction = if upstroke { StrumDirection::Up } else { StrumDirection::Down };
    let template = PluckParams {
        duration,
        ..PluckParams::default()
    };
    dsp::renderer::render_chord_wav(sample_rate, chord, strum, direction, &template, seed as u64).map_err(js_error)
}
