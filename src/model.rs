use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::TrackingMode;

/// Server-assigned tracking session identifier.
pub type SessionId = u64;

/// One raw sample from the position stream, before any filtering.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RawFix {
    pub lat: f64,
    pub lng: f64,
    /// Reported horizontal accuracy in meters.
    pub accuracy: f64,
}

/// An admitted position sample. Immutable once created; queued by the sync
/// manager and eventually serialized inside a [`LocationBatch`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationPoint {
    pub lat: f64,
    pub lng: f64,
    pub mode: String,
    pub accuracy: f64,
    /// RFC 3339 UTC timestamp of admission.
    pub timestamp: String,
}

impl LocationPoint {
    pub fn from_fix(fix: &RawFix, mode: TrackingMode) -> Self {
        LocationPoint {
            lat: fix.lat,
            lng: fix.lng,
            mode: mode.as_str().to_string(),
            accuracy: fix.accuracy,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// The outbound wire message: an ordered batch of points tagged with the
/// session that produced them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationBatch {
    pub session_id: SessionId,
    pub locations: Vec<LocationPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_carries_mode_and_timestamp() {
        let fix = RawFix {
            lat: 28.6139,
            lng: 77.2090,
            accuracy: 12.5,
        };
        let point = LocationPoint::from_fix(&fix, TrackingMode::Bike);
        assert_eq!(point.mode, "bike");
        assert_eq!(point.accuracy, 12.5);
        // RFC 3339 parses back.
        assert!(chrono::DateTime::parse_from_rfc3339(&point.timestamp).is_ok());
    }

    #[test]
    fn test_batch_wire_shape() {
        let fix = RawFix {
            lat: 1.0,
            lng: 2.0,
            accuracy: 3.0,
        };
        let batch = LocationBatch {
            session_id: 42,
            locations: vec![LocationPoint::from_fix(&fix, TrackingMode::Walk)],
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["session_id"], 42);
        assert_eq!(json["locations"][0]["lat"], 1.0);
        assert_eq!(json["locations"][0]["mode"], "walk");
    }
}
