//! Background scheduler for periodic sync cycles.

use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::transport::SyncTransport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs sync cycles on a fixed interval in a background thread.
///
/// Failures never stop the schedule: a connectivity error simply means
/// the next tick tries again. Dropping the scheduler stops the thread.
pub struct SyncScheduler {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Starts a scheduler ticking every `interval`.
    ///
    /// The first cycle runs after one full interval, not immediately;
    /// callers wanting an eager sync invoke [`SyncEngine::run_cycle`]
    /// themselves.
    pub fn start<T: SyncTransport + 'static>(
        engine: Arc<SyncEngine<T>>,
        interval: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            info!(interval_secs = interval.as_secs(), "sync scheduler started");
            while !thread_stop.load(Ordering::Relaxed) {
                // Sleep in short slices so stop() takes effect promptly.
                let mut remaining = interval;
                while !remaining.is_zero() && !thread_stop.load(Ordering::Relaxed) {
                    let slice = remaining.min(Duration::from_millis(200));
                    std::thread::sleep(slice);
                    remaining = remaining.saturating_sub(slice);
                }
                if thread_stop.load(Ordering::Relaxed) {
                    break;
                }

                match engine.run_cycle() {
                    Ok(outcome) => {
                        debug!(records = outcome.total_records(), "scheduled cycle done");
                    }
                    Err(SyncError::CycleInProgress) => {
                        debug!("scheduled cycle skipped, another is running");
                    }
                    Err(err) => {
                        warn!(error = %err, retryable = err.is_retryable(), "scheduled cycle failed");
                    }
                }
            }
            info!("sync scheduler stopped");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the schedule and joins the thread.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
