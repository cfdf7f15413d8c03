//! Convolution reverb with a synthetic impulse response.
//!
//! The impulse response is decaying stereo noise,
//! `(rand * 2 - 1) * (1 - i / len)^decay`, normalised to unit energy. It is
//! convolved with the input using uniformly partitioned overlap-save FFT
//! convolution, so the per-block cost does not grow with the tail length
//! beyond one complex multiply-add per partition.

use std::fmt;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::buffer::AudioBuffer;
use super::context::AudioContext;
use super::effect::{Effect, EffectKind, MIX, ParamSpec, blend, lookup};
use crate::error::Result;
use crate::rng::Rng;

/// Partition size in frames; also the latency of the effect.
pub const PARTITION: usize = 256;
const FFT_SIZE: usize = PARTITION * 2;
const DEFAULT_SEED: u64 = 0x5EB0_0001;

pub const PARAMS: &[ParamSpec] = &[
    ParamSpec::new("duration", 0.1, 6.0, 2.0),
    ParamSpec::new("decay", 0.5, 8.0, 2.0),
    ParamSpec { default: 0.3, ..MIX },
];

/// Stereo decaying-noise impulse response, normalised to unit energy per channel.
pub fn generate_impulse_response(ctx: &AudioContext, duration: f64, decay: f64, rng: &mut Rng) -> AudioBuffer {
    let len = ctx.frames(duration).max(1);
    let mut ir = AudioBuffer::new(2, len, ctx.sample_rate);
    for channel in ir.channels_mut() {
        for (i, sample) in channel.iter_mut().enumerate() {
            let env = (1.0 - i as f64 / len as f64).powf(decay);
            *sample = (rng.rand_bipolar() * env) as f32;
        }
        let energy: f64 = channel.iter().map(|&s| (s as f64) * (s as f64)).sum();
        if energy > 0.0 {
            let norm = (1.0 / energy.sqrt()) as f32;
            channel.iter_mut().for_each(|s| *s *= norm);
        }
    }
    ir
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbParams {
    pub duration: f64,
    pub decay: f64,
    pub mix: f64,
}

impl Default for ReverbParams {
    fn default() -> Self {
        ReverbParams {
            duration: PARAMS[0].default,
            decay: PARAMS[1].default,
            mix: PARAMS[2].default,
        }
    }
}

/// One channel of partitioned convolution. All buffers are sized up front.
#[derive(Clone)]
struct Convolver {
    fft: Arc<dyn RealToComplex<f32>>,
    ifft: Arc<dyn ComplexToReal<f32>>,
    /// Spectra of the impulse response partitions.
    partitions: Vec<Vec<Complex<f32>>>,
    /// Ring of input spectra; `head` holds the newest.
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// `[previous block | block being filled]`
    time_buf: Vec<f32>,
    fft_in: Vec<f32>,
    fft_out: Vec<f32>,
    acc: Vec<Complex<f32>>,
    fwd_scratch: Vec<Complex<f32>>,
    inv_scratch: Vec<Complex<f32>>,
    output: Vec<f32>,
    pos: usize,
}

impl fmt::Debug for Convolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Convolver")
            .field("partitions", &self.partitions.len())
            .field("pos", &self.pos)
            .finish()
    }
}

impl Convolver {
    fn new(planner: &mut RealFftPlanner<f32>, ir: &[f32]) -> Self {
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let ifft = planner.plan_fft_inverse(FFT_SIZE);
        let mut fwd_scratch = fft.make_scratch_vec();
        let inv_scratch = ifft.make_scratch_vec();

        let count = ir.len().div_ceil(PARTITION).max(1);
        let mut partitions = Vec::with_capacity(count);
        let mut padded = fft.make_input_vec();
        for chunk in 0..count {
            padded.fill(0.0);
            let start = chunk * PARTITION;
            let end = (start + PARTITION).min(ir.len());
            padded[..end - start].copy_from_slice(&ir[start..end]);
            let mut spectrum = fft.make_output_vec();
            if fft.process_with_scratch(&mut padded, &mut spectrum, &mut fwd_scratch).is_err() {
                spectrum.fill(Complex::new(0.0, 0.0));
            }
            partitions.push(spectrum);
        }

        let bins = FFT_SIZE / 2 + 1;
        Convolver {
            history: vec![vec![Complex::new(0.0, 0.0); bins]; count],
            head: 0,
            time_buf: vec![0.0; FFT_SIZE],
            fft_in: vec![0.0; FFT_SIZE],
            fft_out: vec![0.0; FFT_SIZE],
            acc: vec![Complex::new(0.0, 0.0); bins],
            output: vec![0.0; PARTITION],
            pos: 0,
            partitions,
            fwd_scratch,
            inv_scratch,
            fft,
            ifft,
        }
    }

    /// Push one input sample; returns `(dry, wet)` delayed by one partition.
    #[inline]
    fn process(&mut self, input: f32) -> (f32, f32) {
        let dry = self.time_buf[self.pos];
        let wet = self.output[self.pos];
        self.time_buf[PARTITION + self.pos] = input;
        self.pos += 1;
        if self.pos == PARTITION {
            self.run_block();
            self.time_buf.copy_within(PARTITION.., 0);
            self.pos = 0;
        }
        (dry, wet)
    }

    fn run_block(&mut self) {
        let count = self.partitions.len();
        self.head = (self.head + count - 1) % count;

        // realfft overwrites its input.
        self.fft_in.copy_from_slice(&self.time_buf);
        let newest = &mut self.history[self.head];
        if self
            .fft
            .process_with_scratch(&mut self.fft_in, newest, &mut self.fwd_scratch)
            .is_err()
        {
            newest.fill(Complex::new(0.0, 0.0));
        }

        self.acc.fill(Complex::new(0.0, 0.0));
        for (p, h) in self.partitions.iter().enumerate() {
            let x = &self.history[(self.head + p) % count];
            for ((acc, x), h) in self.acc.iter_mut().zip(x).zip(h) {
                *acc += x * h;
            }
        }
        let last = self.acc.len() - 1;
        self.acc[0].im = 0.0;
        self.acc[last].im = 0.0;

        if self
            .ifft
            .process_with_scratch(&mut self.acc, &mut self.fft_out, &mut self.inv_scratch)
            .is_err()
        {
            self.fft_out.fill(0.0);
        }
        let norm = 1.0 / FFT_SIZE as f32;
        for (out, &y) in self.output.iter_mut().zip(&self.fft_out[PARTITION..]) {
            *out = y * norm;
        }
    }

    fn clear(&mut self) {
        for spectrum in &mut self.history {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.time_buf.fill(0.0);
        self.output.fill(0.0);
        self.head = 0;
        self.pos = 0;
    }
}

/// Stereo convolution reverb. Dry and wet paths share the one-partition latency.
#[derive(Debug, Clone)]
pub struct Reverb {
    pub duration: f64,
    pub decay: f64,
    pub mix: f64,
    sample_rate: f64,
    seed: u64,
    left: Convolver,
    right: Convolver,
}

impl Reverb {
    pub fn new(ctx: &AudioContext) -> Self {
        Self::build(ctx, ReverbParams::default(), DEFAULT_SEED)
    }

    pub fn with_params(ctx: &AudioContext, params: ReverbParams) -> Result<Self> {
        PARAMS[0].check(params.duration)?;
        PARAMS[1].check(params.decay)?;
        PARAMS[2].check(params.mix)?;
        Ok(Self::build(ctx, params, DEFAULT_SEED))
    }

    fn build(ctx: &AudioContext, params: ReverbParams, seed: u64) -> Self {
        let ir = generate_impulse_response(ctx, params.duration, params.decay, &mut Rng::new_with_seed(seed));
        let mut planner = RealFftPlanner::<f32>::new();
        Reverb {
            duration: params.duration,
            decay: params.decay,
            mix: params.mix,
            sample_rate: ctx.sample_rate,
            seed,
            left: Convolver::new(&mut planner, ir.channel(0)),
            right: Convolver::new(&mut planner, ir.channel(1)),
        }
    }

    /// Regenerate the impulse response. Allocates; a running engine never
    /// calls this on the render thread (see `EffectKind::rebuilds_on`).
    fn rebuild(&mut self) {
        let ctx = AudioContext::new(self.sample_rate, PARTITION);
        let params = ReverbParams {
            duration: self.duration,
            decay: self.decay,
            mix: self.mix,
        };
        log::debug!("reverb: rebuilding impulse response ({:.2}s, decay {:.2})", self.duration, self.decay);
        *self = Self::build(&ctx, params, self.seed);
    }

    pub fn impulse_partitions(&self) -> usize {
        self.left.partitions.len()
    }
}

impl Effect for Reverb {
    fn kind(&self) -> EffectKind {
        EffectKind::Reverb
    }

    fn params(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<()> {
        let spec = lookup(PARAMS, self.kind(), name)?;
        let value = spec.clamp(value);
        match name {
            "duration" if value != self.duration => {
                self.duration = value;
                self.rebuild();
            }
            "decay" if value != self.decay => {
                self.decay = value;
                self.rebuild();
            }
            "mix" => self.mix = value,
            _ => {}
        }
        Ok(())
    }

    fn get_parameter(&self, name: &str) -> Option<f64> {
        match name {
            "duration" => Some(self.duration),
            "decay" => Some(self.decay),
            "mix" => Some(self.mix),
            _ => None,
        }
    }

    #[inline]
    fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let mix = self.mix as f32;
        let (dry_l, wet_l) = self.left.process(left);
        let (dry_r, wet_r) = self.right.process(right);
        (blend(dry_l, wet_l, mix), blend(dry_r, wet_r, mix))
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
    }

    fn latency(&self) -> usize {
        PARTITION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AudioContext {
        AudioContext::new(44100.0, 128)
    }

    #[test]
    fn impulse_response_shape() {
        let ir = generate_impulse_response(&ctx(), 1.0, 2.0, &mut Rng::new_with_seed(1));
        assert_eq!(ir.num_channels(), 2);
        assert_eq!(ir.frames(), 44100);
        for ch in 0..2 {
            let energy: f64 = ir.channel(ch).iter().map(|&s| (s as f64).powi(2)).sum();
            assert!((energy - 1.0).abs() < 1e-3, "channel {ch} energy {energy}");
        }
        let head: f64 = ir.channel(0)[..4410].iter().map(|s| s.abs() as f64).sum();
        let tail: f64 = ir.channel(0)[39690..].iter().map(|s| s.abs() as f64).sum();
        assert!(head > tail * 10.0, "impulse response should decay");
        assert_ne!(ir.channel(0)[..64], ir.channel(1)[..64]);
    }

    /// Direct convolution of the first few output samples against the FFT path.
    #[test]
    fn matches_direct_convolution() {
        let params = ReverbParams {
            duration: 0.1,
            decay: 2.0,
            mix: 1.0,
        };
        let mut reverb = Reverb::with_params(&ctx(), params).unwrap();
        let ir = generate_impulse_response(&ctx(), 0.1, 2.0, &mut Rng::new_with_seed(DEFAULT_SEED));
        let h = ir.channel(0);

        let input: Vec<f32> = (0..2048).map(|i| ((i * 37 % 101) as f32 / 101.0) - 0.5).collect();
        let mut out = Vec::new();
        for &x in &input {
            out.push(reverb.process_frame(x, x).0);
        }
        for n in [0usize, 10, 300, 700, 1500] {
            let expected: f32 = (0..=n).filter(|&k| k < h.len()).map(|k| h[k] * input[n - k]).sum();
            let got = out[n + PARTITION];
            assert!((got - expected).abs() < 1e-3, "frame {n}: got {got}, expected {expected}");
        }
    }

    #[test]
    fn dry_path_is_delayed_by_latency() {
        let mut reverb = Reverb::new(&ctx());
        reverb.set_parameter("mix", 0.0).unwrap();
        let mut out = Vec::new();
        for i in 0..1024 {
            out.push(reverb.process_frame(i as f32, 0.0).0);
        }
        assert_eq!(out[PARTITION], 0.0);
        assert_eq!(out[PARTITION + 10], 10.0);
        assert_eq!(reverb.latency(), PARTITION);
    }

    #[test]
    fn tail_rings_after_impulse() {
        let mut reverb = Reverb::new(&ctx());
        reverb.set_parameter("mix", 1.0).unwrap();
        reverb.process_frame(1.0, 1.0);
        let mut late = 0.0_f32;
        for i in 0..44100 {
            let (l, _) = reverb.process_frame(0.0, 0.0);
            if i > 22050 {
                late = late.max(l.abs());
            }
        }
        assert!(late > 0.0, "two second reverb should still ring after half a second");
    }

    #[test]
    fn duration_change_rebuilds_partitions() {
        let mut reverb = Reverb::new(&ctx());
        let before = reverb.impulse_partitions();
        reverb.set_parameter("duration", 0.5).unwrap();
        assert!(reverb.impulse_partitions() < before);
        assert_eq!(reverb.get_parameter("duration"), Some(0.5));
        reverb.set_parameter("duration", 100.0).unwrap();
        assert_eq!(reverb.get_parameter("duration"), Some(6.0));
    }

    #[test]
    fn strict_constructor_rejects_out_of_range() {
        let params = ReverbParams {
            decay: 20.0,
            ..ReverbParams::default()
        };
        assert!(Reverb::with_params(&ctx(), params).is_err());
    }
}
