//! Wheel motor drivers and the two-wheel [`DriveTrain`].
//!
//! The motor driver hardware exposes one primitive: "set drive power for
//! wheel W in `[-100, 100]`".  [`DriveTrain::apply`] clamps every command
//! before it reaches that primitive, even though the actuator mapper already
//! clamps; a driver never sees an out-of-range value.

use dohyo_types::{DohyoError, MotorCommand};
use tracing::{trace, warn};

/// A single independently driven wheel.
pub trait WheelMotor: Send {
    /// Stable identifier, e.g. `"left_wheel"`.
    fn id(&self) -> &str;

    /// Drive the wheel at `power` percent (`-100.0..=100.0`, negative is
    /// backwards).
    ///
    /// # Errors
    ///
    /// Returns [`DohyoError::HardwareFault`] if the driver rejects the write.
    fn set_power(&mut self, power: f32) -> Result<(), DohyoError>;

    /// Most recently applied power.
    fn power(&self) -> f32;
}

/// Differential drive made of a left and a right [`WheelMotor`].
pub struct DriveTrain {
    left: Box<dyn WheelMotor>,
    right: Box<dyn WheelMotor>,
}

impl DriveTrain {
    pub fn new(left: Box<dyn WheelMotor>, right: Box<dyn WheelMotor>) -> Self {
        Self { left, right }
    }

    /// Apply `command` to both wheels.
    ///
    /// Both wheels are always written, even if the first write fails, so a
    /// single bad driver cannot leave the other wheel on a stale command.
    ///
    /// # Errors
    ///
    /// Returns the first [`DohyoError::HardwareFault`] reported by either
    /// wheel.
    pub fn apply(&mut self, command: &MotorCommand) -> Result<(), DohyoError> {
        let safe = command.clamped();
        if safe != *command {
            warn!(
                left = command.left,
                right = command.right,
                "motor command out of range; clamped before write"
            );
        }
        trace!(left = safe.left, right = safe.right, "applying motor command");
        let left = self.left.set_power(safe.left);
        let right = self.right.set_power(safe.right);
        left.and(right)
    }

    /// Command zero power on both wheels.
    pub fn stop(&mut self) -> Result<(), DohyoError> {
        self.apply(&MotorCommand::stop())
    }

    /// `(left, right)` powers most recently applied.
    pub fn powers(&self) -> (f32, f32) {
        (self.left.power(), self.right.power())
    }
}
