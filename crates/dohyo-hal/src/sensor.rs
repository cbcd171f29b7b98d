//! Generic `Sensor` trait for every reading source on the robot.
//!
//! Drivers implement this trait and register themselves with a
//! [`SensorHub`][crate::hub::SensorHub].  The hub owns timestamps and
//! staleness; a driver only reports whether it has something new.

use dohyo_types::{DohyoError, SampleValue, SensorId};

/// A single physical sensor.
pub trait Sensor: Send {
    /// Which sensor slot this driver fills.
    fn id(&self) -> SensorId;

    /// Return the reading that arrived since the previous poll, if any.
    ///
    /// Must never block: a driver with no new hardware data returns
    /// `Ok(None)` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`DohyoError::SensorFault`] when the device cannot be read.
    /// The hub treats this as "no fresh reading".
    fn poll(&mut self) -> Result<Option<SampleValue>, DohyoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sensor that yields a fixed list of readings, then nothing.
    struct ScriptedBumper {
        script: Vec<bool>,
    }

    impl Sensor for ScriptedBumper {
        fn id(&self) -> SensorId {
            SensorId::ContactLeft
        }

        fn poll(&mut self) -> Result<Option<SampleValue>, DohyoError> {
            Ok(self.script.pop().map(SampleValue::Contact))
        }
    }

    #[test]
    fn scripted_sensor_drains_then_reports_nothing() {
        let mut s = ScriptedBumper {
            script: vec![false, true],
        };
        assert_eq!(s.id(), SensorId::ContactLeft);
        assert_eq!(s.poll().unwrap(), Some(SampleValue::Contact(true)));
        assert_eq!(s.poll().unwrap(), Some(SampleValue::Contact(false)));
        assert_eq!(s.poll().unwrap(), None);
    }
}
