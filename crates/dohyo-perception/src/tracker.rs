//! Range-finder fusion.
//!
//! Combines the front and rear range finders into one [`TargetEstimate`].
//!
//! A range sample *detects* when it is valid and its distance lies inside the
//! configured detection band.  When both sensors detect, the closer one wins
//! (ties go to the front).  Bearing comes from the lateral offset when the
//! sensor reports one:
//!
//! ```text
//! front: bearing = atan2(lateral, distance)
//! rear:  bearing = wrap_180(180° − atan2(lateral, distance))
//! ```
//!
//! and is 0° (front) or 180° (rear) otherwise.  There is no smoothing: one
//! cycle without a detection is an immediate "target lost".
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use dohyo_perception::tracker::{TargetTracker, TrackerConfig};
//! use dohyo_types::{SampleSet, SampleValue, SensorId, SensorSample, TargetSource};
//!
//! let tracker = TargetTracker::new(TrackerConfig::default());
//! let now = Duration::from_millis(20);
//! let samples = SampleSet::empty(now).with(SensorSample::fresh(
//!     SensorId::RangeFront,
//!     SampleValue::Range { distance_cm: 20.0, lateral_cm: None },
//!     now,
//! ));
//!
//! let target = tracker.track(&samples);
//! assert!(target.present);
//! assert_eq!(target.source, TargetSource::Front);
//! ```

use dohyo_types::{SampleSet, SensorSample, TargetEstimate, TargetSource};
use serde::{Deserialize, Serialize};
use tracing::trace;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Detection band shared by both range finders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Readings closer than this are treated as noise (cm).
    pub detect_min_cm: f32,
    /// Readings farther than this are outside the ring (cm).
    pub detect_max_cm: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            detect_min_cm: 1.0,
            detect_max_cm: 40.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

/// A [`TargetEstimate`] together with which range finders could not be used
/// this cycle because their samples were invalid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackOutcome {
    pub estimate: TargetEstimate,
    pub front_unusable: bool,
    pub rear_unusable: bool,
}

struct Detection {
    distance_cm: f32,
    bearing_deg: f32,
    source: TargetSource,
}

// ────────────────────────────────────────────────────────────────────────────
// TargetTracker
// ────────────────────────────────────────────────────────────────────────────

/// Stateless fusion of the front and rear range finders.
#[derive(Debug, Clone)]
pub struct TargetTracker {
    config: TrackerConfig,
}

impl TargetTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Estimate the opponent's position from this cycle's samples.
    pub fn track(&self, samples: &SampleSet) -> TargetEstimate {
        self.track_with_diagnostics(samples).estimate
    }

    /// Like [`track`][Self::track], also reporting unusable range finders.
    pub fn track_with_diagnostics(&self, samples: &SampleSet) -> TrackOutcome {
        let front = self.detect(&samples.range_front, TargetSource::Front);
        let rear = self.detect(&samples.range_rear, TargetSource::Rear);

        let chosen = match (front, rear) {
            (Some(f), Some(r)) if r.distance_cm < f.distance_cm => Some(r),
            (Some(f), _) => Some(f),
            (None, r) => r,
        };

        let estimate = match chosen {
            Some(d) => TargetEstimate {
                present: true,
                bearing_deg: d.bearing_deg,
                distance_cm: Some(d.distance_cm),
                source: d.source,
            },
            None => TargetEstimate::absent(),
        };
        trace!(?estimate, "target estimate");

        TrackOutcome {
            estimate,
            front_unusable: !samples.range_front.valid,
            rear_unusable: !samples.range_rear.valid,
        }
    }

    fn detect(&self, sample: &SensorSample, source: TargetSource) -> Option<Detection> {
        let (distance_cm, lateral_cm) = sample.usable()?.range()?;
        if !distance_cm.is_finite()
            || distance_cm < self.config.detect_min_cm
            || distance_cm > self.config.detect_max_cm
        {
            return None;
        }

        let offset = lateral_cm
            .filter(|l| l.is_finite())
            .map(|l| l.atan2(distance_cm).to_degrees())
            .unwrap_or(0.0);
        let bearing_deg = match source {
            TargetSource::Rear => wrap_180(180.0 - offset),
            _ => wrap_180(offset),
        };

        Some(Detection {
            distance_cm,
            bearing_deg,
            source,
        })
    }
}

/// Wrap an angle in degrees into `[-180, 180]`.  Exactly ±180 is preserved.
pub fn wrap_180(deg: f32) -> f32 {
    if (-180.0..=180.0).contains(&deg) {
        return deg;
    }
    let wrapped = (deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && deg > 0.0 { 180.0 } else { wrapped }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use dohyo_types::{SampleValue, SensorId};
    use std::time::Duration;

    const NOW: Duration = Duration::from_millis(100);

    fn range(id: SensorId, distance_cm: f32, lateral_cm: Option<f32>) -> SensorSample {
        SensorSample::fresh(
            id,
            SampleValue::Range {
                distance_cm,
                lateral_cm,
            },
            NOW,
        )
    }

    fn stale(mut s: SensorSample) -> SensorSample {
        s.valid = false;
        s
    }

    fn tracker() -> TargetTracker {
        TargetTracker::new(TrackerConfig::default())
    }

    #[test]
    fn nothing_reported_means_absent() {
        let t = tracker().track(&SampleSet::empty(NOW));
        assert!(!t.present);
        assert_eq!(t.source, TargetSource::None);
        assert_eq!(t.distance_cm, None);
    }

    #[test]
    fn both_invalid_means_absent_even_with_in_band_values() {
        let samples = SampleSet::empty(NOW)
            .with(stale(range(SensorId::RangeFront, 20.0, None)))
            .with(stale(range(SensorId::RangeRear, 10.0, None)));
        let out = tracker().track_with_diagnostics(&samples);
        assert!(!out.estimate.present);
        assert!(out.front_unusable);
        assert!(out.rear_unusable);
    }

    #[test]
    fn out_of_band_readings_are_ignored() {
        let samples = SampleSet::empty(NOW)
            .with(range(SensorId::RangeFront, 120.0, None))
            .with(range(SensorId::RangeRear, 0.2, None));
        assert!(!tracker().track(&samples).present);
    }

    #[test]
    fn front_only_detection_at_twenty() {
        let samples = SampleSet::empty(NOW)
            .with(range(SensorId::RangeFront, 20.0, None))
            .with(stale(range(SensorId::RangeRear, 5.0, None)));
        let t = tracker().track(&samples);
        assert!(t.present);
        assert_eq!(t.source, TargetSource::Front);
        assert_eq!(t.distance_cm, Some(20.0));
        assert_eq!(t.bearing_deg, 0.0);
    }

    #[test]
    fn rear_only_detection_is_directly_behind() {
        let samples = SampleSet::empty(NOW).with(range(SensorId::RangeRear, 15.0, None));
        let t = tracker().track(&samples);
        assert_eq!(t.source, TargetSource::Rear);
        assert_eq!(t.bearing_deg, 180.0);
    }

    #[test]
    fn closer_detection_wins() {
        let samples = SampleSet::empty(NOW)
            .with(range(SensorId::RangeFront, 30.0, None))
            .with(range(SensorId::RangeRear, 12.0, None));
        let t = tracker().track(&samples);
        assert_eq!(t.source, TargetSource::Rear);
        assert_eq!(t.distance_cm, Some(12.0));

        let tie = SampleSet::empty(NOW)
            .with(range(SensorId::RangeFront, 12.0, None))
            .with(range(SensorId::RangeRear, 12.0, None));
        assert_eq!(tracker().track(&tie).source, TargetSource::Front);
    }

    #[test]
    fn lateral_offset_gives_bearing() {
        let front = SampleSet::empty(NOW).with(range(SensorId::RangeFront, 10.0, Some(10.0)));
        let t = tracker().track(&front);
        assert!((t.bearing_deg - 45.0).abs() < 1e-3);

        let left = SampleSet::empty(NOW).with(range(SensorId::RangeFront, 10.0, Some(-10.0)));
        assert!((tracker().track(&left).bearing_deg + 45.0).abs() < 1e-3);
    }

    #[test]
    fn rear_lateral_offset_wraps_into_range() {
        // Behind and to the right.
        let right = SampleSet::empty(NOW).with(range(SensorId::RangeRear, 10.0, Some(10.0)));
        assert!((tracker().track(&right).bearing_deg - 135.0).abs() < 1e-3);

        // Behind and to the left.
        let left = SampleSet::empty(NOW).with(range(SensorId::RangeRear, 10.0, Some(-10.0)));
        assert!((tracker().track(&left).bearing_deg + 135.0).abs() < 1e-3);
    }

    #[test]
    fn estimate_has_no_memory() {
        let tracker = tracker();
        let seen = SampleSet::empty(NOW).with(range(SensorId::RangeFront, 20.0, None));
        assert!(tracker.track(&seen).present);
        assert!(!tracker.track(&SampleSet::empty(NOW)).present);
    }

    #[test]
    fn wrap_180_handles_all_quadrants() {
        assert_eq!(wrap_180(0.0), 0.0);
        assert_eq!(wrap_180(180.0), 180.0);
        assert_eq!(wrap_180(-180.0), -180.0);
        assert!((wrap_180(190.0) + 170.0).abs() < 1e-4);
        assert!((wrap_180(-190.0) - 170.0).abs() < 1e-4);
        assert!((wrap_180(540.0) - 180.0).abs() < 1e-4);
        assert!((wrap_180(725.0) - 5.0).abs() < 1e-4);
    }
}
