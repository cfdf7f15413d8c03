//! Step timing and the clocks that drive it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::dsp::engine::EngineStatus;

/// Sixteenth-note step timing with swing.
///
/// Swing lengthens the gap after every odd step by
/// `step_duration * swing / 100 * 0.5`. The extra time is not taken back
/// on the following step, so a swung bar runs slightly longer than a
/// straight one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerClock {
    pub bpm: f64,
    /// Percent, 0 to 100.
    pub swing: f64,
    step_count: usize,
    current_step: usize,
    next_step_time: f64,
}

impl SequencerClock {
    pub fn new(bpm: f64, swing: f64, step_count: usize) -> Self {
        SequencerClock {
            bpm,
            swing,
            step_count: step_count.max(1),
            current_step: 0,
            next_step_time: 0.0,
        }
    }

    /// Seconds per sixteenth note.
    pub fn step_duration(&self) -> f64 {
        60.0 / self.bpm / 4.0
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn next_step_time(&self) -> f64 {
        self.next_step_time
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn set_step_count(&mut self, step_count: usize) {
        self.step_count = step_count.max(1);
        self.current_step %= self.step_count;
    }

    /// Back to step 0 with the first deadline at `now`.
    pub fn reset(&mut self, now: f64) {
        self.current_step = 0;
        self.next_step_time = now;
    }

    /// Move past the current step. Returns the new current step.
    pub fn advance(&mut self) -> usize {
        let d = self.step_duration();
        let swing = if self.swing > 0.0 && self.current_step % 2 == 1 {
            d * self.swing / 100.0 * 0.5
        } else {
            0.0
        };
        self.next_step_time += d + swing;
        self.current_step = (self.current_step + 1) % self.step_count;
        self.current_step
    }
}

/// A monotonic time source in seconds.
pub trait ClockSource {
    fn now(&self) -> f64;
}

/// Clock that only moves when told to. Shareable between threads.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start: f64) -> Self {
        ManualClock(AtomicU64::new(start.to_bits()))
    }

    pub fn set(&self, seconds: f64) {
        self.0.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn advance(&self, seconds: f64) {
        self.set(self.now() + seconds);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

impl<C: ClockSource + ?Sized> ClockSource for Arc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}

/// Seconds since construction.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: Instant,
}

impl Default for WallClock {
    fn default() -> Self {
        WallClock { origin: Instant::now() }
    }
}

impl WallClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClockSource for WallClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Frames rendered by an engine, in seconds. Scheduling against this keeps
/// triggers locked to the audio output.
#[derive(Debug, Clone)]
pub struct AudioClock {
    status: Arc<EngineStatus>,
    sample_rate: f64,
}

impl AudioClock {
    pub fn new(status: Arc<EngineStatus>, sample_rate: f64) -> Self {
        AudioClock { status, sample_rate }
    }
}

impl ClockSource for AudioClock {
    fn now(&self) -> f64 {
        self.status.frame() as f64 / self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;

    fn deadlines(clock: &mut SequencerClock, n: usize) -> Vec<f64> {
        (0..n)
            .map(|_| {
                let t = clock.next_step_time();
                clock.advance();
                t
            })
            .collect()
    }

    #[test]
    fn straight_steps_are_uniform() {
        let mut clock = SequencerClock::new(120.0, 0.0, 16);
        clock.reset(0.0);
        assert!(approx_eq!(f64, clock.step_duration(), 0.125, ulps = 2));
        let times = deadlines(&mut clock, 17);
        for (i, pair) in times.windows(2).enumerate() {
            assert!(approx_eq!(f64, pair[1] - pair[0], 0.125, epsilon = 1e-12), "gap {i}");
        }
        assert_eq!(clock.current_step(), 1);
    }

    #[test]
    fn full_swing_adds_half_a_step_after_odd_steps() {
        let mut clock = SequencerClock::new(120.0, 100.0, 16);
        clock.reset(1.0);
        let times = deadlines(&mut clock, 5);
        let gaps: Vec<f64> = times.windows(2).map(|p| p[1] - p[0]).collect();
        // after step 0 (even), 1 (odd), 2 (even), 3 (odd)
        let expected = [0.125, 0.1875, 0.125, 0.1875];
        for (gap, want) in gaps.iter().zip(expected) {
            assert!(approx_eq!(f64, *gap, want, epsilon = 1e-12), "gap {gap} != {want}");
        }
    }

    #[test]
    fn step_wraps_at_step_count() {
        let mut clock = SequencerClock::new(100.0, 0.0, 4);
        clock.reset(0.0);
        let steps: Vec<usize> = (0..6).map(|_| clock.advance()).collect();
        assert_eq!(steps, vec![1, 2, 3, 0, 1, 2]);
    }

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::new(0.5);
        clock.advance(0.25);
        assert_eq!(clock.now(), 0.75);
        let shared = Arc::new(clock);
        shared.set(2.0);
        assert_eq!(ClockSource::now(&shared), 2.0);
    }

    #[test]
    fn audio_clock_reads_engine_frames() {
        let status = Arc::new(EngineStatus::default());
        let clock = AudioClock::new(Arc::clone(&status), 1000.0);
        status.set_frame(2500);
        assert_eq!(clock.now(), 2.5);
    }
}
