//! Wall-clock thread that ticks a shared sequencer.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;

use super::clock::ClockSource;
use crate::config::SequencerConfig;
use super::transport::Sequencer;
use super::TriggerSink;

/// Runs `tick` every `interval` on its own thread.
///
/// The thread sleeps on a stop channel rather than a plain sleep, so
/// [`TimerDriver::stop`] takes effect immediately instead of after the
/// current interval. On the way out it stops the sequencer, which cancels
/// whatever the sink still has pending.
pub struct TimerDriver<S: TriggerSink + Send + 'static> {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<S>>,
}

impl<S: TriggerSink + Send + 'static> TimerDriver<S> {
    pub fn spawn<C>(sequencer: Arc<Mutex<Sequencer>>, clock: C, sink: S, interval: Duration) -> Self
    where
        C: ClockSource + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("sequencer-timer".into())
            .spawn(move || run(sequencer, clock, sink, interval, stop_rx));
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("failed to spawn sequencer timer: {e}");
                None
            }
        };
        TimerDriver {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// Spawn with the configured `tick_interval_ms`.
    pub fn from_config<C>(sequencer: Arc<Mutex<Sequencer>>, clock: C, sink: S, config: &SequencerConfig) -> Self
    where
        C: ClockSource + Send + 'static,
    {
        Self::spawn(sequencer, clock, sink, config.tick_interval())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and hand the sink back.
    pub fn stop(mut self) -> Option<S> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<S> {
        // Dropping the sender wakes the thread with `Disconnected`.
        drop(self.stop_tx.take());
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(sink) => Some(sink),
            Err(_) => {
                log::error!("sequencer timer thread panicked");
                None
            }
        }
    }
}

impl<S: TriggerSink + Send + 'static> Drop for TimerDriver<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<C: ClockSource, S: TriggerSink>(
    sequencer: Arc<Mutex<Sequencer>>,
    clock: C,
    mut sink: S,
    interval: Duration,
    stop_rx: Receiver<()>,
) -> S {
    log::debug!("sequencer timer running every {interval:?}");
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                sequencer.lock().tick(clock.now(), &mut sink);
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    sequencer.lock().stop(clock.now(), &mut sink);
    log::debug!("sequencer timer exited");
    sink
}
