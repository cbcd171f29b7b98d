//! In-process simulated hardware for tests, replays and CI.
//!
//! [`SimSensor`] and [`SimMotor`] are ordinary drivers whose behaviour is
//! steered from the outside through cloneable handles ([`SimFeed`] and
//! [`SimMotorProbe`]).  [`SimRig`] wires a full set of them into a
//! [`SensorHub`] and a [`DriveTrain`], so the whole control core runs without
//! a robot attached.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use dohyo_hal::clock::ManualClock;
//! use dohyo_hal::sim::SimRig;
//! use dohyo_types::{MotorCommand, SampleValue, SensorId};
//!
//! let (mut hub, mut drive, handles) =
//!     SimRig::new(Arc::new(ManualClock::new()), Duration::from_millis(100))
//!         .with_all_sensors()
//!         .build();
//!
//! handles.push(SensorId::ContactLeft, SampleValue::Contact(true));
//! assert!(hub.snapshot().contact_confirmed());
//!
//! drive.apply(&MotorCommand::new(40.0, 40.0)).expect("sim drive must succeed");
//! assert_eq!(handles.left.power(), 40.0);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dohyo_types::{DohyoError, SampleValue, SensorId};

use crate::clock::Clock;
use crate::hub::SensorHub;
use crate::motor::{DriveTrain, WheelMotor};
use crate::sensor::Sensor;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated sensor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FeedState {
    pending: Option<SampleValue>,
    failure: Option<String>,
}

/// Handle used to inject readings into a [`SimSensor`].
#[derive(Debug, Clone, Default)]
pub struct SimFeed {
    state: Arc<Mutex<FeedState>>,
}

impl SimFeed {
    /// Deliver `value` on the sensor's next poll.  A second push before the
    /// poll replaces the first.
    pub fn push(&self, value: SampleValue) {
        lock(&self.state).pending = Some(value);
    }

    /// Make every subsequent poll fail with `reason`.
    pub fn fail(&self, reason: impl Into<String>) {
        lock(&self.state).failure = Some(reason.into());
    }

    /// Undo [`fail`][Self::fail].
    pub fn recover(&self) {
        lock(&self.state).failure = None;
    }
}

/// A sensor driver that reports whatever its [`SimFeed`] was given.
pub struct SimSensor {
    id: SensorId,
    feed: SimFeed,
}

impl SimSensor {
    /// Create a simulated sensor and the feed that drives it.
    pub fn new(id: SensorId) -> (Box<Self>, SimFeed) {
        let feed = SimFeed::default();
        (
            Box::new(Self {
                id,
                feed: feed.clone(),
            }),
            feed,
        )
    }
}

impl Sensor for SimSensor {
    fn id(&self) -> SensorId {
        self.id
    }

    fn poll(&mut self) -> Result<Option<SampleValue>, DohyoError> {
        let mut state = lock(&self.feed.state);
        if let Some(reason) = &state.failure {
            return Err(DohyoError::SensorFault {
                sensor: self.id,
                details: reason.clone(),
            });
        }
        Ok(state.pending.take())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated motor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MotorState {
    power: f32,
    writes: u64,
    failure: Option<String>,
}

/// Handle used to inspect and break a [`SimMotor`].
#[derive(Debug, Clone, Default)]
pub struct SimMotorProbe {
    state: Arc<Mutex<MotorState>>,
}

impl SimMotorProbe {
    /// Last power successfully written.
    pub fn power(&self) -> f32 {
        lock(&self.state).power
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> u64 {
        lock(&self.state).writes
    }

    /// Make every subsequent write fail with `reason`.
    pub fn fail(&self, reason: impl Into<String>) {
        lock(&self.state).failure = Some(reason.into());
    }

    pub fn recover(&self) {
        lock(&self.state).failure = None;
    }
}

/// A wheel motor that records the powers written to it.
pub struct SimMotor {
    id: String,
    probe: SimMotorProbe,
}

impl SimMotor {
    /// Create a simulated motor and the probe that observes it.
    pub fn new(id: impl Into<String>) -> (Box<Self>, SimMotorProbe) {
        let probe = SimMotorProbe::default();
        (
            Box::new(Self {
                id: id.into(),
                probe: probe.clone(),
            }),
            probe,
        )
    }
}

impl WheelMotor for SimMotor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_power(&mut self, power: f32) -> Result<(), DohyoError> {
        let mut state = lock(&self.probe.state);
        if let Some(reason) = &state.failure {
            return Err(DohyoError::HardwareFault {
                component: self.id.clone(),
                details: reason.clone(),
            });
        }
        state.power = power;
        state.writes += 1;
        Ok(())
    }

    fn power(&self) -> f32 {
        lock(&self.probe.state).power
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRig builder
// ────────────────────────────────────────────────────────────────────────────

/// Handles to every simulated device produced by [`SimRig::build`].
pub struct SimHandles {
    feeds: HashMap<SensorId, SimFeed>,
    pub left: SimMotorProbe,
    pub right: SimMotorProbe,
}

impl SimHandles {
    pub fn feed(&self, id: SensorId) -> Option<&SimFeed> {
        self.feeds.get(&id)
    }

    /// Push `value` to sensor `id`.  Returns `false` if that sensor was not
    /// part of the rig.
    pub fn push(&self, id: SensorId, value: SampleValue) -> bool {
        match self.feeds.get(&id) {
            Some(feed) => {
                feed.push(value);
                true
            }
            None => false,
        }
    }
}

/// Builder for a simulated robot: a [`SensorHub`] of [`SimSensor`]s and a
/// [`DriveTrain`] of two [`SimMotor`]s.
pub struct SimRig {
    clock: Arc<dyn Clock>,
    staleness: Duration,
    sensors: Vec<SensorId>,
}

impl SimRig {
    pub fn new(clock: Arc<dyn Clock>, staleness: Duration) -> Self {
        Self {
            clock,
            staleness,
            sensors: Vec::new(),
        }
    }

    pub fn with_sensor(mut self, id: SensorId) -> Self {
        if !self.sensors.contains(&id) {
            self.sensors.push(id);
        }
        self
    }

    /// Fit every sensor in [`SensorId::ALL`].
    pub fn with_all_sensors(self) -> Self {
        SensorId::ALL
            .into_iter()
            .fold(self, |rig, id| rig.with_sensor(id))
    }

    pub fn build(self) -> (SensorHub, DriveTrain, SimHandles) {
        let mut hub = SensorHub::new(self.clock, self.staleness);
        let mut feeds = HashMap::new();
        for id in self.sensors {
            let (sensor, feed) = SimSensor::new(id);
            hub.register(sensor);
            feeds.insert(id, feed);
        }
        let (left, left_probe) = SimMotor::new("left_wheel");
        let (right, right_probe) = SimMotor::new("right_wheel");
        (
            hub,
            DriveTrain::new(left, right),
            SimHandles {
                feeds,
                left: left_probe,
                right: right_probe,
            },
        )
    }
}
