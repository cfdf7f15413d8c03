//! The effect interface, the closed set of effect variants, and chains.
//!
//! Every effect is a typed struct with a static parameter table. Runtime
//! parameter changes go through [`Effect::set_parameter`], which clamps;
//! the typed `with_params` constructors reject out-of-range values instead.
//! Processing is stereo and allocation-free.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::buffer::AudioBuffer;
use super::chorus::Chorus;
use super::compressor::Compressor;
use super::context::AudioContext;
use super::delay::Echo;
use super::distortion::Distortion;
use super::eq::Eq;
use super::phaser::Phaser;
use super::quantizer::Quantizer;
use super::reverb::Reverb;
use super::tremolo::Tremolo;
use crate::error::{Result, SynthError, check_range};

/// Range and default of one effect parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ParamSpec {
    pub const fn new(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        ParamSpec { name, min, max, default }
    }

    /// NaN falls back to the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() { self.default } else { value.clamp(self.min, self.max) }
    }

    pub fn check(&self, value: f64) -> Result<f64> {
        check_range(self.name, value, self.min, self.max)?;
        Ok(value)
    }
}

/// Shared wet/dry parameter.
pub const MIX: ParamSpec = ParamSpec::new("mix", 0.0, 1.0, 1.0);

/// Find `name` in `specs`, or fail with `UnknownParameter`.
pub fn lookup(specs: &'static [ParamSpec], kind: EffectKind, name: &str) -> Result<&'static ParamSpec> {
    specs
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| SynthError::UnknownParameter {
            effect: kind.name().to_string(),
            param: name.to_string(),
        })
}

#[inline]
pub fn blend(dry: f32, wet: f32, mix: f32) -> f32 {
    dry * (1.0 - mix) + wet * mix
}

pub trait Effect {
    fn kind(&self) -> EffectKind;

    fn params(&self) -> &'static [ParamSpec];

    /// Clamp `value` into range and apply it. Unknown names are an error.
    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()>;

    fn get_parameter(&self, name: &str) -> Option<f64>;

    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32);

    fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.process_frame(*l, *r);
            *l = out_l;
            *r = out_r;
        }
    }

    /// Clear internal state (delay lines, filters, followers).
    fn reset(&mut self);

    /// Frames of delay the wet path adds.
    fn latency(&self) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Reverb,
    #[serde(alias = "delay")]
    Echo,
    Distortion,
    Eq,
    Chorus,
    Phaser,
    Compressor,
    #[serde(alias = "autotune")]
    Quantizer,
    Tremolo,
}

impl EffectKind {
    pub const ALL: [EffectKind; 9] = [
        EffectKind::Reverb,
        EffectKind::Echo,
        EffectKind::Distortion,
        EffectKind::Eq,
        EffectKind::Chorus,
        EffectKind::Phaser,
        EffectKind::Compressor,
        EffectKind::Quantizer,
        EffectKind::Tremolo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Echo => "echo",
            EffectKind::Distortion => "distortion",
            EffectKind::Eq => "eq",
            EffectKind::Chorus => "chorus",
            EffectKind::Phaser => "phaser",
            EffectKind::Compressor => "compressor",
            EffectKind::Quantizer => "quantizer",
            EffectKind::Tremolo => "tremolo",
        }
    }

    /// Parameter table, available without building the effect.
    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            EffectKind::Reverb => super::reverb::PARAMS,
            EffectKind::Echo => super::delay::PARAMS,
            EffectKind::Distortion => super::distortion::PARAMS,
            EffectKind::Eq => super::eq::PARAMS,
            EffectKind::Chorus => super::chorus::PARAMS,
            EffectKind::Phaser => super::phaser::PARAMS,
            EffectKind::Compressor => super::compressor::PARAMS,
            EffectKind::Quantizer => super::quantizer::PARAMS,
            EffectKind::Tremolo => super::tremolo::PARAMS,
        }
    }
}

impl EffectKind {
    /// Whether setting `name` rebuilds the effect's buffers. Such changes
    /// allocate, so a running engine applies them to a fresh node built off
    /// the render thread.
    pub fn rebuilds_on(self, name: &str) -> bool {
        matches!((self, name), (EffectKind::Reverb, "duration" | "decay"))
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectKind {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "reverb" => EffectKind::Reverb,
            "echo" | "delay" => EffectKind::Echo,
            "distortion" => EffectKind::Distortion,
            "eq" => EffectKind::Eq,
            "chorus" => EffectKind::Chorus,
            "phaser" => EffectKind::Phaser,
            "compressor" => EffectKind::Compressor,
            "quantizer" | "autotune" => EffectKind::Quantizer,
            "tremolo" => EffectKind::Tremolo,
            _ => return Err(SynthError::UnknownEffect(s.to_string())),
        };
        Ok(kind)
    }
}

/// One effect of any kind, dispatched statically.
#[derive(Debug, Clone)]
pub enum EffectNode {
    Reverb(Reverb),
    Echo(Echo),
    Distortion(Distortion),
    Eq(Eq),
    Chorus(Chorus),
    Phaser(Phaser),
    Compressor(Compressor),
    Quantizer(Quantizer),
    Tremolo(Tremolo),
}

macro_rules! dispatch {
    ($node:expr, $fx:ident => $body:expr) => {
        match $node {
            EffectNode::Reverb($fx) => $body,
            EffectNode::Echo($fx) => $body,
            EffectNode::Distortion($fx) => $body,
            EffectNode::Eq($fx) => $body,
            EffectNode::Chorus($fx) => $body,
            EffectNode::Phaser($fx) => $body,
            EffectNode::Compressor($fx) => $body,
            EffectNode::Quantizer($fx) => $body,
            EffectNode::Tremolo($fx) => $body,
        }
    };
}

impl EffectNode {
    /// An effect of `kind` with default parameters.
    pub fn new(kind: EffectKind, ctx: &AudioContext) -> Self {
        match kind {
            EffectKind::Reverb => EffectNode::Reverb(Reverb::new(ctx)),
            EffectKind::Echo => EffectNode::Echo(Echo::new(ctx)),
            EffectKind::Distortion => EffectNode::Distortion(Distortion::new(ctx)),
            EffectKind::Eq => EffectNode::Eq(Eq::new(ctx)),
            EffectKind::Chorus => EffectNode::Chorus(Chorus::new(ctx)),
            EffectKind::Phaser => EffectNode::Phaser(Phaser::new(ctx)),
            EffectKind::Compressor => EffectNode::Compressor(Compressor::new(ctx)),
            EffectKind::Quantizer => EffectNode::Quantizer(Quantizer::new(ctx)),
            EffectKind::Tremolo => EffectNode::Tremolo(Tremolo::new(ctx)),
        }
    }

    /// Build from a flat parameter map. Values are clamped; unknown keys fail.
    pub fn from_params(kind: EffectKind, ctx: &AudioContext, params: &BTreeMap<String, f64>) -> Result<Self> {
        let mut node = EffectNode::new(kind, ctx);
        for (name, &value) in params {
            node.set_parameter(name, value)?;
        }
        Ok(node)
    }

    /// Current parameters as a flat map.
    pub fn parameters(&self) -> BTreeMap<String, f64> {
        self.params()
            .iter()
            .filter_map(|spec| self.get_parameter(spec.name).map(|v| (spec.name.to_string(), v)))
            .collect()
    }
}

impl Effect for EffectNode {
    fn kind(&self) -> EffectKind {
        dispatch!(self, fx => fx.kind())
    }

    fn params(&self) -> &'static [ParamSpec] {
        dispatch!(self, fx => fx.params())
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        dispatch!(self, fx => fx.set_parameter(name, value))
    }

    fn get_parameter(&self, name: &str) -> Option<f64> {
        dispatch!(self, fx => fx.get_parameter(name))
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        dispatch!(self, fx => fx.process_frame(left, right))
    }

    fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        dispatch!(self, fx => fx.process_block(left, right))
    }

    fn reset(&mut self) {
        dispatch!(self, fx => fx.reset())
    }

    fn latency(&self) -> usize {
        dispatch!(self, fx => fx.latency())
    }
}

fn enabled_default() -> bool {
    true
}

/// Serializable description of one chain slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    pub effect: EffectKind,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl EffectConfig {
    pub fn new(effect: EffectKind) -> Self {
        EffectConfig {
            effect,
            enabled: true,
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub effects: Vec<EffectConfig>,
}

impl ChainConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SynthError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone)]
struct ChainSlot {
    node: EffectNode,
    enabled: bool,
}

/// Ordered effects applied in series. Disabled slots are skipped.
#[derive(Debug, Clone, Default)]
pub struct EffectChain {
    slots: Vec<ChainSlot>,
}

impl EffectChain {
    pub fn new() -> Self {
        EffectChain { slots: Vec::new() }
    }

    pub fn from_config(ctx: &AudioContext, config: &ChainConfig) -> Result<Self> {
        let mut chain = EffectChain::new();
        for slot in &config.effects {
            let node = EffectNode::from_params(slot.effect, ctx, &slot.params)?;
            chain.slots.push(ChainSlot {
                node,
                enabled: slot.enabled,
            });
        }
        Ok(chain)
    }

    pub fn push(&mut self, node: EffectNode) {
        self.slots.push(ChainSlot { node, enabled: true });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&EffectNode> {
        self.slots.get(index).map(|s| &s.node)
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.enabled = enabled;
        }
    }

    /// Exchange the node at `index` with `node`, keeping the slot's enabled
    /// flag. Returns false (leaving `node` untouched) for a bad index.
    pub fn swap_node(&mut self, index: usize, node: &mut EffectNode) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                std::mem::swap(&mut slot.node, node);
                true
            }
            None => false,
        }
    }

    pub fn set_parameter(&mut self, index: usize, name: &str, value: f64) -> Result<()> {
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            SynthError::configuration("index", index as f64, "no effect at this chain position")
        })?;
        slot.node.set_parameter(name, value)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for slot in self.slots.iter_mut().filter(|s| s.enabled) {
            slot.node.process_block(left, right);
        }
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.node.reset();
        }
    }

    pub fn config(&self) -> ChainConfig {
        ChainConfig {
            effects: self
                .slots
                .iter()
                .map(|s| EffectConfig {
                    effect: s.node.kind(),
                    enabled: s.enabled,
                    params: s.node.parameters(),
                })
                .collect(),
        }
    }
}

/// Run one effect over a whole buffer offline.
///
/// The output is stereo with the same length as the input; any latency of
/// the effect is compensated by flushing with silence and dropping the head.
pub fn process_buffer(
    ctx: &AudioContext,
    buffer: &AudioBuffer,
    kind: EffectKind,
    params: &BTreeMap<String, f64>,
) -> Result<AudioBuffer> {
    let mut node = EffectNode::from_params(kind, ctx, params)?;
    let frames = buffer.frames();
    let latency = node.latency();
    let mut left = Vec::with_capacity(frames + latency);
    let mut right = Vec::with_capacity(frames + latency);
    for i in 0..frames + latency {
        let (l, r) = if i < frames { buffer.frame_stereo(i) } else { (0.0, 0.0) };
        left.push(l);
        right.push(r);
    }
    node.process_block(&mut left, &mut right);
    AudioBuffer::from_channels(vec![left.split_off(latency), right.split_off(latency)], buffer.sample_rate())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AudioContext {
        AudioContext::new(44100.0, 128)
    }

    #[test]
    fn only_reverb_shape_parameters_rebuild() {
        assert!(EffectKind::Reverb.rebuilds_on("duration"));
        assert!(EffectKind::Reverb.rebuilds_on("decay"));
        assert!(!EffectKind::Reverb.rebuilds_on("mix"));
        assert!(!EffectKind::Echo.rebuilds_on("time"));
    }

    #[test]
    fn swap_node_exchanges_in_place() {
        let mut chain = EffectChain::new();
        chain.push(EffectNode::new(EffectKind::Echo, &ctx()));
        chain.set_enabled(0, false);
        let mut node = EffectNode::new(EffectKind::Tremolo, &ctx());
        assert!(chain.swap_node(0, &mut node));
        assert_eq!(node.kind(), EffectKind::Echo);
        assert_eq!(chain.node(0).map(|n| n.kind()), Some(EffectKind::Tremolo));
        assert!(!chain.config().effects[0].enabled);
        assert!(!chain.swap_node(4, &mut node));
    }

    #[test]
    fn names_parse_with_aliases() {
        assert_eq!("delay".parse::<EffectKind>().unwrap(), EffectKind::Echo);
        assert_eq!("autotune".parse::<EffectKind>().unwrap(), EffectKind::Quantizer);
        assert!(matches!("flanger".parse::<EffectKind>(), Err(SynthError::UnknownEffect(_))));
        for kind in EffectKind::ALL {
            assert_eq!(kind.name().parse::<EffectKind>().unwrap(), kind);
        }
    }

    #[test]
    fn every_effect_exposes_mix_or_strength_and_defaults() {
        for kind in EffectKind::ALL {
            let node = EffectNode::new(kind, &ctx());
            assert_eq!(node.kind(), kind);
            for spec in node.params() {
                assert!(spec.min <= spec.default && spec.default <= spec.max, "{kind}.{}", spec.name);
                let current = node.get_parameter(spec.name).expect("listed parameter readable");
                assert!((current - spec.default).abs() < 1e-9, "{kind}.{} default", spec.name);
            }
            let blend = node.params().iter().any(|s| s.name == "mix" || s.name == "strength");
            assert!(blend, "{kind} has no wet/dry control");
        }
    }

    #[test]
    fn set_parameter_clamps() {
        let mut node = EffectNode::new(EffectKind::Echo, &ctx());
        node.set_parameter("feedback", 3.0).unwrap();
        assert_eq!(node.get_parameter("feedback"), Some(0.95));
        node.set_parameter("mix", -1.0).unwrap();
        assert_eq!(node.get_parameter("mix"), Some(0.0));
    }

    #[test]
    fn unknown_parameter_is_an_error() {
        let mut node = EffectNode::new(EffectKind::Chorus, &ctx());
        let err = node.set_parameter("feedback", 0.5).unwrap_err();
        assert_eq!(
            err,
            SynthError::UnknownParameter {
                effect: "chorus".into(),
                param: "feedback".into()
            }
        );
    }

    #[test]
    fn every_effect_outputs_finite_audio() {
        for kind in EffectKind::ALL {
            let mut node = EffectNode::new(kind, &ctx());
            let mut left: Vec<f32> = (0..4096).map(|i| ((i as f32) * 0.05).sin() * 0.8).collect();
            let mut right = left.clone();
            node.process_block(&mut left, &mut right);
            assert!(left.iter().chain(&right).all(|s| s.is_finite()), "{kind} produced non-finite output");
        }
    }

    #[test]
    fn chain_config_from_json() {
        let json = r#"{
            "effects": [
                { "effect": "distortion", "params": { "amount": 250, "tone": 4000 } },
                { "effect": "delay", "enabled": false },
                { "effect": "reverb", "params": { "mix": 0.5 } }
            ]
        }"#;
        let config = ChainConfig::from_json(json).unwrap();
        let chain = EffectChain::from_config(&ctx(), &config).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.node(0).and_then(|n| n.get_parameter("amount")), Some(100.0));
        let round_trip = chain.config();
        assert!(!round_trip.effects[1].enabled);
        assert_eq!(round_trip.effects[1].effect, EffectKind::Echo);
    }

    #[test]
    fn chain_rejects_unknown_effect_name() {
        let json = r#"{ "effects": [ { "effect": "flanger" } ] }"#;
        assert!(matches!(ChainConfig::from_json(json), Err(SynthError::Config(_))));
    }

    #[test]
    fn disabled_slot_is_bypassed() {
        let mut chain = EffectChain::new();
        chain.push(EffectNode::new(EffectKind::Distortion, &ctx()));
        chain.set_enabled(0, false);
        let mut l = vec![0.5_f32; 64];
        let mut r = vec![-0.5_f32; 64];
        chain.process_block(&mut l, &mut r);
        assert!(l.iter().all(|&s| s == 0.5) && r.iter().all(|&s| s == -0.5));
    }

    #[test]
    fn process_buffer_keeps_length_and_aligns_latency() {
        let mut params = BTreeMap::new();
        params.insert("mix".to_string(), 0.0);
        let src = AudioBuffer::from_mono((0..2000).map(|i| (i % 50) as f32 / 50.0).collect(), 44100.0);
        let out = process_buffer(&ctx(), &src, EffectKind::Reverb, &params).unwrap();
        assert_eq!(out.frames(), 2000);
        assert_eq!(out.num_channels(), 2);
        // Fully dry reverb passes the input through unchanged and aligned.
        for i in 0..2000 {
            assert!((out.channel(0)[i] - src.channel(0)[i]).abs() < 1e-6, "frame {i}");
        }
    }
}
