use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Raw fixes with a reported accuracy above this are degenerate and dropped
/// before any other gate.
pub const ACCURACY_CEILING_M: f64 = 2000.0;

/// Send buffer flushes once it holds this many points.
pub const SEND_BUFFER_FLUSH_LEN: usize = 10;

/// Send buffer also flushes when this much time passed since the last flush.
pub const SEND_FLUSH_INTERVAL: Duration = Duration::from_millis(20_000);

/// Cadence of the timer-driven flush check in the session loop.
pub const FLUSH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Hard cap on the offline buffer.
pub const OFFLINE_BUFFER_CAP: usize = 50;

/// On overflow the offline buffer keeps only this many newest entries
/// before the overflowing point is appended.
pub const OFFLINE_BUFFER_RETAIN: usize = 25;

/// Connection attempts are abandoned after this long without an open event.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Fixed wait between an abnormal close and the next reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3_000);

/// Consecutive failed reconnect attempts allowed per active session.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// WebSocket close code for an intentional, locally-initiated stop.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Close code reported when the transport drops without a close frame.
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Transport mode selected for a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    Walk,
    Bike,
    Car,
}

impl TrackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::Walk => "walk",
            TrackingMode::Bike => "bike",
            TrackingMode::Car => "car",
        }
    }

    /// Profile table lookup. Total over the enum, so every mode referenced
    /// at runtime has an entry.
    pub fn profile(&self) -> &'static ModeProfile {
        match self {
            TrackingMode::Walk => &WALK_PROFILE,
            TrackingMode::Bike => &BIKE_PROFILE,
            TrackingMode::Car => &CAR_PROFILE,
        }
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "walk" => Ok(TrackingMode::Walk),
            "bike" => Ok(TrackingMode::Bike),
            "car" => Ok(TrackingMode::Car),
            other => Err(format!("unknown tracking mode '{}'", other)),
        }
    }
}

/// Per-mode thresholds and timings.
#[derive(Debug, Clone, Copy)]
pub struct ModeProfile {
    /// Routing profile name sent to the route endpoint.
    pub profile: &'static str,
    /// Minimum movement between admitted fixes.
    pub min_move_m: f64,
    /// Throttle between route lookups.
    pub route_delay_ms: u64,
    /// A point is network-worthy only at or below this accuracy.
    pub accuracy_limit_m: f64,
    /// Step cadence for route replay.
    pub animation_delay_ms: u64,
}

impl ModeProfile {
    pub fn animation_delay(&self) -> Duration {
        Duration::from_millis(self.animation_delay_ms)
    }
}

pub const WALK_PROFILE: ModeProfile = ModeProfile {
    profile: "foot-walking",
    min_move_m: 8.0,
    route_delay_ms: 2000,
    accuracy_limit_m: 35.0,
    animation_delay_ms: 80,
};

pub const BIKE_PROFILE: ModeProfile = ModeProfile {
    profile: "cycling-regular",
    min_move_m: 12.0,
    route_delay_ms: 1500,
    accuracy_limit_m: 40.0,
    animation_delay_ms: 50,
};

pub const CAR_PROFILE: ModeProfile = ModeProfile {
    profile: "driving-car",
    min_move_m: 25.0,
    route_delay_ms: 1200,
    accuracy_limit_m: 60.0,
    animation_delay_ms: 30,
};
