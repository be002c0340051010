use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::model::RawFix;

/// Watch failures, mirroring the platform error taxonomy. All of these are
/// surfaced as status messages; none of them ends the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location information unavailable")]
    Unavailable,

    #[error("location request timed out")]
    Timeout,

    #[error("location error: {0}")]
    Other(String),
}

/// One event from a position subscription.
#[derive(Debug, Clone)]
pub enum PositionEvent {
    Fix(RawFix),
    Error(PositionError),
}

/// Options passed to the platform watch.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Cached fixes older than this are not delivered.
    pub max_age: Duration,
    /// Per-fix acquisition timeout.
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        WatchOptions {
            high_accuracy: true,
            max_age: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
        }
    }
}

/// A continuous position stream, modeled as a cancellable subscription.
pub trait PositionSource: Send + Sync {
    /// Begin delivering events into `tx` until the returned handle is
    /// released. Delivery order is arrival order.
    fn watch(&self, options: WatchOptions, tx: Sender<PositionEvent>) -> WatchHandle;
}

/// Handle for an active watch. Release is explicit and idempotent; dropping
/// the handle releases as a backstop.
pub struct WatchHandle {
    released: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn new(released: Arc<AtomicBool>, task: JoinHandle<()>) -> Self {
        WatchHandle {
            released,
            task: Some(task),
        }
    }

    pub fn release(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Deterministic position feed for the simulation binary and tests: walks
/// north from a seed point in fixed increments at a fixed cadence.
pub struct SimulatedPositionSource {
    pub seed_lat: f64,
    pub seed_lng: f64,
    /// Degrees of latitude added per fix.
    pub step_deg: f64,
    pub fix_interval: Duration,
    pub accuracy: f64,
}

impl SimulatedPositionSource {
    pub fn new() -> Self {
        SimulatedPositionSource {
            seed_lat: 28.6139,
            seed_lng: 77.2090,
            step_deg: 0.00015,
            fix_interval: Duration::from_secs(1),
            accuracy: 8.0,
        }
    }
}

impl Default for SimulatedPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionSource for SimulatedPositionSource {
    fn watch(&self, _options: WatchOptions, tx: Sender<PositionEvent>) -> WatchHandle {
        let released = Arc::new(AtomicBool::new(false));
        let stop = released.clone();

        let seed_lat = self.seed_lat;
        let seed_lng = self.seed_lng;
        let step_deg = self.step_deg;
        let fix_interval = self.fix_interval;
        let accuracy = self.accuracy;

        let task = tokio::spawn(async move {
            let mut ticker = interval(fix_interval);
            let mut count = 0u64;
            loop {
                ticker.tick().await;
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let fix = RawFix {
                    lat: seed_lat + count as f64 * step_deg,
                    lng: seed_lng,
                    accuracy,
                };
                if tx.send(PositionEvent::Fix(fix)).await.is_err() {
                    break;
                }
                count += 1;
            }
        });

        WatchHandle::new(released, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_source_yields_fixes_in_order() {
        let source = SimulatedPositionSource::new();
        let (tx, mut rx) = mpsc::channel(16);
        let mut handle = source.watch(WatchOptions::default(), tx);

        let mut lats = Vec::new();
        for _ in 0..3 {
            match rx.recv().await.unwrap() {
                PositionEvent::Fix(fix) => lats.push(fix.lat),
                PositionEvent::Error(e) => panic!("unexpected error: {}", e),
            }
        }
        handle.release();

        assert!(lats[0] < lats[1] && lats[1] < lats[2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_idempotent_and_stops_delivery() {
        let source = SimulatedPositionSource::new();
        let (tx, mut rx) = mpsc::channel(16);
        let mut handle = source.watch(WatchOptions::default(), tx);

        assert!(!handle.is_released());
        handle.release();
        handle.release();
        assert!(handle.is_released());

        // Drain whatever was in flight; the stream must end.
        while rx.recv().await.is_some() {}
    }
}
