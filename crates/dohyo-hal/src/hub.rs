//! [`SensorHub`] – the sensor abstraction layer.
//!
//! The hub owns every registered [`Sensor`] driver and the last reading each
//! one produced.  Sampling polls the driver once without blocking; if nothing
//! new arrived the last known reading is returned, and once that reading is
//! older than the staleness threshold the sample is marked invalid.
//!
//! A faulty or silent sensor never stops the control loop.  Its samples are
//! simply invalid, and [`SensorHub::health`] / [`SensorHub::degraded`] make
//! the degradation visible to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dohyo_types::{SampleSet, SampleValue, SensorId, SensorSample};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::sensor::Sensor;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Diagnostic state of one sensor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorHealth {
    /// Last reading is within the staleness threshold.
    Fresh,
    /// A reading exists but is older than the staleness threshold.
    Stale,
    /// Registered, but has never produced a reading.
    NeverSeen,
    /// The most recent poll failed or returned a reading of the wrong kind.
    Faulted,
    /// No driver is registered for this slot.
    Missing,
}

// ────────────────────────────────────────────────────────────────────────────
// Internal slot
// ────────────────────────────────────────────────────────────────────────────

struct Slot {
    driver: Box<dyn Sensor>,
    last: Option<(SampleValue, Duration)>,
    fault: Option<String>,
    stale_reported: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// SensorHub
// ────────────────────────────────────────────────────────────────────────────

/// Registry of sensor drivers that turns their readings into
/// [`SensorSample`]s.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use dohyo_hal::clock::ManualClock;
/// use dohyo_hal::hub::{SensorHealth, SensorHub};
/// use dohyo_hal::sim::SimSensor;
/// use dohyo_types::{SampleValue, SensorId};
///
/// let clock = ManualClock::new();
/// let mut hub = SensorHub::new(Arc::new(clock.clone()), Duration::from_millis(100));
/// let (sensor, feed) = SimSensor::new(SensorId::EdgeLeft);
/// hub.register(sensor);
///
/// feed.push(SampleValue::Reflectance(70.0));
/// assert!(hub.sample(SensorId::EdgeLeft).valid);
///
/// clock.advance(Duration::from_millis(150));
/// assert!(!hub.sample(SensorId::EdgeLeft).valid);
/// assert_eq!(hub.health(SensorId::EdgeLeft), SensorHealth::Stale);
/// ```
pub struct SensorHub {
    slots: HashMap<SensorId, Slot>,
    clock: Arc<dyn Clock>,
    staleness: Duration,
}

impl SensorHub {
    /// Create an empty hub.  Readings older than `staleness` are invalid.
    pub fn new(clock: Arc<dyn Clock>, staleness: Duration) -> Self {
        Self {
            slots: HashMap::new(),
            clock,
            staleness,
        }
    }

    /// Register a sensor driver.  Any previously registered driver for the
    /// same [`SensorId`] is replaced and its history discarded.
    pub fn register(&mut self, sensor: Box<dyn Sensor>) {
        self.slots.insert(
            sensor.id(),
            Slot {
                driver: sensor,
                last: None,
                fault: None,
                stale_reported: false,
            },
        );
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sample one sensor at the current clock time.  Never blocks.
    pub fn sample(&mut self, id: SensorId) -> SensorSample {
        let now = self.clock.now();
        self.sample_at(id, now)
    }

    /// Sample every sensor once, all against the same cycle time.
    pub fn snapshot(&mut self) -> SampleSet {
        let now = self.clock.now();
        let mut set = SampleSet::empty(now);
        for id in SensorId::ALL {
            set.set(self.sample_at(id, now));
        }
        set
    }

    /// Return the [`SensorHealth`] of `id` at the current clock time.
    pub fn health(&self, id: SensorId) -> SensorHealth {
        let now = self.clock.now();
        match self.slots.get(&id) {
            None => SensorHealth::Missing,
            Some(slot) if slot.fault.is_some() => SensorHealth::Faulted,
            Some(slot) => match slot.last {
                None => SensorHealth::NeverSeen,
                Some((_, at)) if self.is_fresh(at, now) => SensorHealth::Fresh,
                Some(_) => SensorHealth::Stale,
            },
        }
    }

    /// Every sensor that is not currently [`SensorHealth::Fresh`], in
    /// [`SensorId::ALL`] order.
    pub fn degraded(&self) -> Vec<SensorId> {
        SensorId::ALL
            .into_iter()
            .filter(|id| self.health(*id) != SensorHealth::Fresh)
            .collect()
    }

    fn is_fresh(&self, read_at: Duration, now: Duration) -> bool {
        now.saturating_sub(read_at) <= self.staleness
    }

    fn sample_at(&mut self, id: SensorId, now: Duration) -> SensorSample {
        let staleness = self.staleness;
        let Some(slot) = self.slots.get_mut(&id) else {
            return SensorSample::missing(id, now);
        };

        match slot.driver.poll() {
            Ok(Some(value)) if value.kind() != id.kind() => {
                let reason = format!("reading of kind {:?} on a {:?} sensor", value.kind(), id.kind());
                Self::mark_fault(slot, id, reason);
            }
            Ok(Some(value)) => {
                if slot.fault.take().is_some() {
                    debug!(sensor = %id, "sensor recovered");
                }
                slot.last = Some((value, now));
                slot.stale_reported = false;
            }
            Ok(None) => {
                slot.fault = None;
            }
            Err(e) => Self::mark_fault(slot, id, e.to_string()),
        }

        match slot.last {
            None => SensorSample::missing(id, now),
            Some((value, read_at)) => {
                let valid = now.saturating_sub(read_at) <= staleness;
                if !valid && !slot.stale_reported {
                    warn!(sensor = %id, age_ms = now.saturating_sub(read_at).as_millis() as u64, "sensor reading went stale");
                    slot.stale_reported = true;
                }
                SensorSample {
                    sensor: id,
                    value: Some(value),
                    timestamp: read_at,
                    valid,
                }
            }
        }
    }

    fn mark_fault(slot: &mut Slot, id: SensorId, reason: String) {
        if slot.fault.is_none() {
            warn!(sensor = %id, reason = %reason, "sensor fault; treating as no fresh reading");
        }
        slot.fault = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::sim::SimSensor;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn hub_with(ids: &[SensorId]) -> (SensorHub, ManualClock, Vec<crate::sim::SimFeed>) {
        let clock = ManualClock::new();
        let mut hub = SensorHub::new(Arc::new(clock.clone()), ms(100));
        let mut feeds = Vec::new();
        for id in ids {
            let (sensor, feed) = SimSensor::new(*id);
            hub.register(sensor);
            feeds.push(feed);
        }
        (hub, clock, feeds)
    }

    #[test]
    fn unregistered_sensor_is_missing_and_invalid() {
        let (mut hub, _clock, _feeds) = hub_with(&[]);
        let s = hub.sample(SensorId::RangeFront);
        assert!(!s.valid);
        assert!(s.value.is_none());
        assert_eq!(hub.health(SensorId::RangeFront), SensorHealth::Missing);
    }

    #[test]
    fn registered_but_silent_sensor_is_never_seen() {
        let (mut hub, _clock, _feeds) = hub_with(&[SensorId::Orientation]);
        assert!(!hub.sample(SensorId::Orientation).valid);
        assert_eq!(hub.health(SensorId::Orientation), SensorHealth::NeverSeen);
    }

    #[test]
    fn reading_stays_valid_until_staleness_threshold() {
        let (mut hub, clock, feeds) = hub_with(&[SensorId::EdgeLeft]);
        feeds[0].push(SampleValue::Reflectance(80.0));
        let first = hub.sample(SensorId::EdgeLeft);
        assert!(first.valid);
        assert_eq!(first.timestamp, Duration::ZERO);

        clock.advance(ms(100));
        assert!(hub.sample(SensorId::EdgeLeft).valid, "exactly at threshold is still fresh");

        clock.advance(ms(1));
        let stale = hub.sample(SensorId::EdgeLeft);
        assert!(!stale.valid);
        assert_eq!(stale.value, Some(SampleValue::Reflectance(80.0)));
        assert_eq!(stale.timestamp, Duration::ZERO);
    }

    #[test]
    fn repeated_reads_without_new_data_are_identical() {
        let (mut hub, clock, feeds) = hub_with(&[SensorId::RangeFront]);
        clock.advance(ms(40));
        feeds[0].push(SampleValue::Range {
            distance_cm: 20.0,
            lateral_cm: Some(1.5),
        });
        let a = hub.sample(SensorId::RangeFront);
        let b = hub.sample(SensorId::RangeFront);
        assert_eq!(a, b);
    }

    #[test]
    fn fresh_reading_replaces_previous_one() {
        let (mut hub, clock, feeds) = hub_with(&[SensorId::ContactLeft]);
        feeds[0].push(SampleValue::Contact(false));
        hub.sample(SensorId::ContactLeft);
        clock.advance(ms(20));
        feeds[0].push(SampleValue::Contact(true));
        let s = hub.sample(SensorId::ContactLeft);
        assert_eq!(s.value, Some(SampleValue::Contact(true)));
        assert_eq!(s.timestamp, ms(20));
    }

    #[test]
    fn driver_fault_degrades_without_panicking() {
        let (mut hub, clock, feeds) = hub_with(&[SensorId::RangeRear]);
        feeds[0].push(SampleValue::Range {
            distance_cm: 10.0,
            lateral_cm: None,
        });
        hub.sample(SensorId::RangeRear);

        feeds[0].fail("bus error");
        clock.advance(ms(20));
        let s = hub.sample(SensorId::RangeRear);
        // The last good reading is still inside the staleness window.
        assert!(s.valid);
        assert_eq!(hub.health(SensorId::RangeRear), SensorHealth::Faulted);
        assert!(hub.degraded().contains(&SensorId::RangeRear));

        clock.advance(ms(200));
        assert!(!hub.sample(SensorId::RangeRear).valid);

        feeds[0].recover();
        feeds[0].push(SampleValue::Range {
            distance_cm: 12.0,
            lateral_cm: None,
        });
        assert!(hub.sample(SensorId::RangeRear).valid);
        assert_eq!(hub.health(SensorId::RangeRear), SensorHealth::Fresh);
    }

    #[test]
    fn wrong_kind_reading_is_rejected() {
        let (mut hub, _clock, feeds) = hub_with(&[SensorId::EdgeRight]);
        feeds[0].push(SampleValue::Contact(true));
        let s = hub.sample(SensorId::EdgeRight);
        assert!(!s.valid);
        assert!(s.value.is_none());
        assert_eq!(hub.health(SensorId::EdgeRight), SensorHealth::Faulted);
    }

    #[test]
    fn snapshot_samples_every_slot_at_one_time() {
        let (mut hub, clock, feeds) = hub_with(&[SensorId::EdgeLeft, SensorId::Orientation]);
        clock.advance(ms(60));
        feeds[0].push(SampleValue::Reflectance(55.0));
        feeds[1].push(SampleValue::AngularRate(12.0));
        let set = hub.snapshot();
        assert_eq!(set.taken_at, ms(60));
        assert!(set.edge_left.valid);
        assert!(set.orientation.valid);
        assert!(!set.range_front.valid);

        let degraded = hub.degraded();
        assert!(!degraded.contains(&SensorId::EdgeLeft));
        assert!(degraded.contains(&SensorId::RangeFront));
    }

    #[test]
    fn re_registering_discards_history() {
        let (mut hub, _clock, feeds) = hub_with(&[SensorId::ContactRight]);
        feeds[0].push(SampleValue::Contact(true));
        assert!(hub.sample(SensorId::ContactRight).valid);

        let (fresh, _feed) = SimSensor::new(SensorId::ContactRight);
        hub.register(fresh);
        assert_eq!(hub.health(SensorId::ContactRight), SensorHealth::NeverSeen);
    }
}
