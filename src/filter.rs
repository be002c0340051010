use crate::config::{ModeProfile, ACCURACY_CEILING_M};
use crate::geo::haversine_distance;
use crate::model::RawFix;

/// Outcome of evaluating one raw fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// Fix accepted; the marker moves and the point is a send candidate.
    Admit,
    /// Accuracy above the sanity ceiling; surface a low-accuracy notice.
    RejectAccuracy,
    /// Moved less than the mode's minimum; dropped silently.
    RejectDistance,
}

/// Admission gate for the raw position stream. Tracks the last admitted
/// point so the movement check is always against what the marker shows.
pub struct PositionFilter {
    profile: &'static ModeProfile,
    last_point: Option<(f64, f64)>,
}

impl PositionFilter {
    pub fn new(profile: &'static ModeProfile) -> Self {
        PositionFilter {
            profile,
            last_point: None,
        }
    }

    /// Decide admit/reject for one sample. `last_point` only moves on
    /// admission.
    pub fn evaluate(&mut self, fix: &RawFix) -> FilterVerdict {
        if fix.accuracy > ACCURACY_CEILING_M {
            return FilterVerdict::RejectAccuracy;
        }

        match self.last_point {
            // First sample of the session establishes the anchor.
            None => {
                self.last_point = Some((fix.lat, fix.lng));
                FilterVerdict::Admit
            }
            Some((last_lat, last_lng)) => {
                let distance = haversine_distance(last_lat, last_lng, fix.lat, fix.lng);
                if distance < self.profile.min_move_m {
                    return FilterVerdict::RejectDistance;
                }
                self.last_point = Some((fix.lat, fix.lng));
                FilterVerdict::Admit
            }
        }
    }

    /// The accuracy gate applied at send time. Independent of the movement
    /// gate: it controls what is network-worthy, not what the marker shows.
    pub fn network_worthy(&self, fix: &RawFix) -> bool {
        fix.accuracy <= self.profile.accuracy_limit_m
    }

    pub fn last_point(&self) -> Option<(f64, f64)> {
        self.last_point
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TrackingMode, CAR_PROFILE, WALK_PROFILE};

    // ~10 m north of the base point.
    const BASE: (f64, f64) = (28.6139, 77.2090);
    const TEN_M_NORTH: (f64, f64) = (28.61399, 77.2090);

    fn fix(lat: f64, lng: f64, accuracy: f64) -> RawFix {
        RawFix { lat, lng, accuracy }
    }

    #[test]
    fn test_first_fix_admitted() {
        let mut filter = PositionFilter::new(TrackingMode::Walk.profile());
        assert_eq!(
            filter.evaluate(&fix(BASE.0, BASE.1, 10.0)),
            FilterVerdict::Admit
        );
        assert_eq!(filter.last_point(), Some(BASE));
    }

    #[test]
    fn test_sanity_ceiling_rejects_without_side_effect() {
        let mut filter = PositionFilter::new(TrackingMode::Walk.profile());
        filter.evaluate(&fix(BASE.0, BASE.1, 10.0));

        let verdict = filter.evaluate(&fix(30.0, 80.0, 2500.0));
        assert_eq!(verdict, FilterVerdict::RejectAccuracy);
        // last_point must not move on a degenerate fix.
        assert_eq!(filter.last_point(), Some(BASE));
    }

    #[test]
    fn test_ceiling_applies_to_first_fix_too() {
        let mut filter = PositionFilter::new(TrackingMode::Walk.profile());
        assert_eq!(
            filter.evaluate(&fix(BASE.0, BASE.1, 2000.1)),
            FilterVerdict::RejectAccuracy
        );
        assert_eq!(filter.last_point(), None);
    }

    #[test]
    fn test_car_rejects_ten_meters() {
        // 10 m < 25 m min move for car.
        let mut filter = PositionFilter::new(TrackingMode::Car.profile());
        filter.evaluate(&fix(BASE.0, BASE.1, 5.0));
        assert_eq!(
            filter.evaluate(&fix(TEN_M_NORTH.0, TEN_M_NORTH.1, 5.0)),
            FilterVerdict::RejectDistance
        );
        assert_eq!(filter.last_point(), Some(BASE));
    }

    #[test]
    fn test_walk_admits_ten_meters() {
        // 10 m >= 8 m min move for walk.
        let mut filter = PositionFilter::new(TrackingMode::Walk.profile());
        filter.evaluate(&fix(BASE.0, BASE.1, 5.0));
        assert_eq!(
            filter.evaluate(&fix(TEN_M_NORTH.0, TEN_M_NORTH.1, 5.0)),
            FilterVerdict::Admit
        );
        assert_eq!(filter.last_point(), Some(TEN_M_NORTH));
    }

    #[test]
    fn test_admitted_points_respect_min_move() {
        let mut filter = PositionFilter::new(TrackingMode::Bike.profile());
        let mut admitted: Vec<(f64, f64)> = Vec::new();

        // March north in ~5.5 m steps; only every third or so should pass
        // the 12 m bike gate.
        let mut lat = BASE.0;
        for _ in 0..40 {
            if filter.evaluate(&fix(lat, BASE.1, 5.0)) == FilterVerdict::Admit {
                admitted.push((lat, BASE.1));
            }
            lat += 0.00005;
        }

        assert!(admitted.len() > 2);
        for pair in admitted.windows(2) {
            let d = haversine_distance(pair[0].0, pair[0].1, pair[1].0, pair[1].1);
            assert!(d >= 12.0, "consecutive admitted points only {:.1} m apart", d);
        }
    }

    #[test]
    fn test_network_worthy_gate_is_independent() {
        let filter = PositionFilter::new(&CAR_PROFILE);
        assert!(filter.network_worthy(&fix(0.0, 0.0, 60.0)));
        assert!(!filter.network_worthy(&fix(0.0, 0.0, 60.1)));

        let filter = PositionFilter::new(&WALK_PROFILE);
        assert!(!filter.network_worthy(&fix(0.0, 0.0, 36.0)));
    }
}
