//! [`SafetyMonitor`] – ring-exit and spin guard.
//!
//! Runs every cycle before the state machine, whatever state it is in.  Two
//! conditions are reported:
//!
//! - **edge**: a valid reflectance sample on either edge sensor is beyond the
//!   threshold.  Acted on in the same cycle, no debounce.
//! - **orientation instability**: successive gyro readings stay above the
//!   threshold for longer than the debounce interval, measured between the
//!   readings' own timestamps.  A single noisy reading never triggers it,
//!   however long it stays valid.
//!
//! The only memory the monitor keeps is the onset time of the current
//! over-rate streak.  The returned [`SafetyStatus`] is rebuilt every cycle.

use std::time::Duration;

use dohyo_types::{EdgeSide, SampleSet, SafetyStatus, SensorSample};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Which side of the threshold counts as the ring boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolarity {
    /// Boundary reads darker than the threshold.
    #[default]
    Below,
    /// Boundary reads brighter than the threshold (white border ring).
    Above,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyConfig {
    pub reflectance_threshold: f32,
    pub polarity: EdgePolarity,
    /// Yaw rate magnitude (deg/s) above which the robot may be spinning out.
    pub rate_threshold_dps: f32,
    pub orientation_debounce: Duration,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            reflectance_threshold: 40.0,
            polarity: EdgePolarity::Below,
            rate_threshold_dps: 360.0,
            orientation_debounce: Duration::from_millis(100),
        }
    }
}

/// Cross-cutting guard evaluated every control cycle.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use dohyo_kernel::safety::{SafetyConfig, SafetyMonitor};
/// use dohyo_types::{EdgeSide, SampleSet, SampleValue, SensorId, SensorSample};
///
/// let mut monitor = SafetyMonitor::new(SafetyConfig::default());
/// let now = Duration::from_millis(20);
/// let samples = SampleSet::empty(now).with(SensorSample::fresh(
///     SensorId::EdgeRight,
///     SampleValue::Reflectance(5.0),
///     now,
/// ));
///
/// let status = monitor.evaluate(&samples);
/// assert!(status.edge_detected);
/// assert_eq!(status.edge_side, Some(EdgeSide::Right));
/// ```
#[derive(Debug)]
pub struct SafetyMonitor {
    config: SafetyConfig,
    over_rate_since: Option<Duration>,
}

impl SafetyMonitor {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            over_rate_since: None,
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Derive this cycle's [`SafetyStatus`].
    pub fn evaluate(&mut self, samples: &SampleSet) -> SafetyStatus {
        let left = self.is_edge(&samples.edge_left);
        let right = self.is_edge(&samples.edge_right);
        let edge_side = match (left, right) {
            (true, true) => Some(EdgeSide::Both),
            (true, false) => Some(EdgeSide::Left),
            (false, true) => Some(EdgeSide::Right),
            (false, false) => None,
        };

        let status = SafetyStatus {
            edge_detected: edge_side.is_some(),
            orientation_unstable: self.orientation_unstable(samples),
            edge_side,
        };
        if status.edge_detected {
            warn!(side = ?edge_side, "ring edge detected");
        }
        status
    }

    fn is_edge(&self, sample: &SensorSample) -> bool {
        let Some(reflectance) = sample.usable().and_then(|v| v.reflectance()) else {
            return false;
        };
        match self.config.polarity {
            EdgePolarity::Below => reflectance < self.config.reflectance_threshold,
            EdgePolarity::Above => reflectance > self.config.reflectance_threshold,
        }
    }

    fn orientation_unstable(&mut self, samples: &SampleSet) -> bool {
        let gyro = &samples.orientation;
        let over = gyro
            .usable()
            .and_then(|v| v.angular_rate())
            .is_some_and(|rate| rate.abs() > self.config.rate_threshold_dps);

        if !over {
            if self.over_rate_since.take().is_some() {
                debug!("yaw rate back under threshold");
            }
            return false;
        }

        // Timed on reading timestamps: a re-served reading does not extend
        // the streak, only fresh over-threshold readings do.
        let since = *self.over_rate_since.get_or_insert(gyro.timestamp);
        let over_for = gyro.timestamp.saturating_sub(since);
        let unstable = over_for > self.config.orientation_debounce;
        if unstable {
            warn!(over_for_ms = over_for.as_millis() as u64, "orientation unstable");
        }
        unstable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dohyo_types::{SampleValue, SensorId};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn edge(id: SensorId, reflectance: f32, at: Duration) -> SensorSample {
        SensorSample::fresh(id, SampleValue::Reflectance(reflectance), at)
    }

    fn gyro(rate: f32, at: Duration) -> SampleSet {
        SampleSet::empty(at).with(SensorSample::fresh(
            SensorId::Orientation,
            SampleValue::AngularRate(rate),
            at,
        ))
    }

    #[test]
    fn bright_surface_is_not_an_edge() {
        let mut m = SafetyMonitor::new(SafetyConfig::default());
        let samples = SampleSet::empty(ms(0))
            .with(edge(SensorId::EdgeLeft, 70.0, ms(0)))
            .with(edge(SensorId::EdgeRight, 65.0, ms(0)));
        assert_eq!(m.evaluate(&samples), SafetyStatus::clear());
    }

    #[test]
    fn either_sensor_below_threshold_is_an_edge() {
        let mut m = SafetyMonitor::new(SafetyConfig::default());
        let left = SampleSet::empty(ms(0)).with(edge(SensorId::EdgeLeft, 12.0, ms(0)));
        let s = m.evaluate(&left);
        assert!(s.edge_detected);
        assert_eq!(s.edge_side, Some(EdgeSide::Left));

        let both = SampleSet::empty(ms(0))
            .with(edge(SensorId::EdgeLeft, 12.0, ms(0)))
            .with(edge(SensorId::EdgeRight, 3.0, ms(0)));
        assert_eq!(m.evaluate(&both).edge_side, Some(EdgeSide::Both));
    }

    #[test]
    fn invalid_edge_sample_is_no_edge_signal() {
        let mut m = SafetyMonitor::new(SafetyConfig::default());
        let mut stale = edge(SensorId::EdgeLeft, 0.0, ms(0));
        stale.valid = false;
        let s = m.evaluate(&SampleSet::empty(ms(500)).with(stale));
        assert!(!s.edge_detected);
        assert_eq!(s.edge_side, None);
    }

    #[test]
    fn above_polarity_flips_the_comparison() {
        let mut m = SafetyMonitor::new(SafetyConfig {
            polarity: EdgePolarity::Above,
            ..SafetyConfig::default()
        });
        let white = SampleSet::empty(ms(0)).with(edge(SensorId::EdgeRight, 85.0, ms(0)));
        assert!(m.evaluate(&white).edge_detected);
        let black = SampleSet::empty(ms(0)).with(edge(SensorId::EdgeRight, 10.0, ms(0)));
        assert!(!m.evaluate(&black).edge_detected);
    }

    #[test]
    fn single_spike_does_not_trigger_instability() {
        let mut m = SafetyMonitor::new(SafetyConfig::default());
        assert!(!m.evaluate(&gyro(900.0, ms(0))).orientation_unstable);
        assert!(!m.evaluate(&gyro(20.0, ms(20))).orientation_unstable);
        assert!(!m.evaluate(&gyro(900.0, ms(40))).orientation_unstable);
    }

    #[test]
    fn sustained_spin_triggers_after_debounce() {
        let mut m = SafetyMonitor::new(SafetyConfig::default());
        for t in [0, 20, 40, 60, 80, 100] {
            assert!(
                !m.evaluate(&gyro(-500.0, ms(t))).orientation_unstable,
                "not yet unstable at {t} ms"
            );
        }
        assert!(m.evaluate(&gyro(-500.0, ms(120))).orientation_unstable);
        // Dropping back under the threshold clears it immediately.
        assert!(!m.evaluate(&gyro(0.0, ms(140))).orientation_unstable);
    }

    #[test]
    fn invalid_gyro_resets_the_streak() {
        let mut m = SafetyMonitor::new(SafetyConfig::default());
        m.evaluate(&gyro(500.0, ms(0)));
        m.evaluate(&gyro(500.0, ms(80)));
        // Gyro goes silent: no evidence of spinning.
        assert!(!m.evaluate(&SampleSet::empty(ms(100))).orientation_unstable);
        assert!(!m.evaluate(&gyro(500.0, ms(120))).orientation_unstable);
    }

    #[test]
    fn one_reading_served_for_many_cycles_is_not_a_spin() {
        let mut m = SafetyMonitor::new(SafetyConfig::default());
        // The same reading from t=0, still valid under a long staleness
        // window, seen by cycles well past the debounce interval.
        let spike = SensorSample::fresh(SensorId::Orientation, SampleValue::AngularRate(900.0), ms(0));
        for t in (0..=280).step_by(20) {
            let samples = SampleSet::empty(ms(t)).with(spike);
            assert!(!m.evaluate(&samples).orientation_unstable, "unstable at {t} ms");
        }
    }

    #[test]
    fn status_is_rebuilt_every_cycle() {
        let mut m = SafetyMonitor::new(SafetyConfig::default());
        let edge_cycle = SampleSet::empty(ms(0)).with(edge(SensorId::EdgeLeft, 5.0, ms(0)));
        assert!(m.evaluate(&edge_cycle).edge_detected);
        let clear_cycle = SampleSet::empty(ms(20)).with(edge(SensorId::EdgeLeft, 60.0, ms(20)));
        assert!(!m.evaluate(&clear_cycle).edge_detected);
    }
}
