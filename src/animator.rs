use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::ModeProfile;
use crate::sinks::MarkerSink;

/// Monotonically increasing generation counter. A running animation is
/// valid only while its captured generation equals the current one, which
/// makes superseding or stopping an animation a single `bump`.
#[derive(Clone)]
pub struct AnimationToken {
    counter: Arc<AtomicU64>,
}

impl AnimationToken {
    pub fn new() -> Self {
        AnimationToken {
            counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Invalidate every outstanding guard.
    pub fn bump(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Bump, then capture the new generation.
    pub fn bump_and_capture(&self) -> TokenGuard {
        let generation = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        TokenGuard {
            counter: self.counter.clone(),
            generation,
        }
    }
}

impl Default for AnimationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// A captured generation. Valid until the token is bumped again.
pub struct TokenGuard {
    counter: Arc<AtomicU64>,
    generation: u64,
}

impl TokenGuard {
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.generation
    }
}

/// Replays a precomputed path as simulated marker movement. Visual only:
/// replay steps never re-enter the position filter or the sync manager.
pub struct RouteAnimator {
    token: AnimationToken,
    session_active: Arc<AtomicBool>,
    marker: Arc<dyn MarkerSink>,
}

impl RouteAnimator {
    pub fn new(
        token: AnimationToken,
        session_active: Arc<AtomicBool>,
        marker: Arc<dyn MarkerSink>,
    ) -> Self {
        RouteAnimator {
            token,
            session_active,
            marker,
        }
    }

    /// Start replaying `route`, superseding any running animation. Each
    /// scheduled step re-checks that the session is still active and that
    /// its generation is still current, and silently ends otherwise;
    /// cancellation is cooperative and lazy, not preemptive.
    pub fn play(&self, route: Vec<(f64, f64)>, profile: &'static ModeProfile) -> JoinHandle<()> {
        let guard = self.token.bump_and_capture();
        let active = self.session_active.clone();
        let marker = self.marker.clone();
        let delay = profile.animation_delay();

        tokio::spawn(async move {
            for (lat, lng) in route {
                if !active.load(Ordering::SeqCst) || !guard.is_current() {
                    return;
                }
                marker.on_route_step(lat, lng);
                sleep(delay).await;
            }
        })
    }
}
