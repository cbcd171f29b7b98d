//! `dohyo-hal` – Hardware Abstraction Layer
//!
//! The control core never talks to a device directly.  Sensors and wheel
//! motors are reached through the traits in this crate, so real drivers and
//! the simulated rig in [`sim`] are interchangeable.
//!
//! # Modules
//!
//! - [`clock`] – [`Clock`][clock::Clock]: monotonic time since start, with a
//!   wall-clock implementation and a manually advanced one for tests.
//! - [`sensor`] – [`Sensor`][sensor::Sensor]: non-blocking "read latest
//!   sample" primitive implemented by every sensor driver.
//! - [`hub`] – [`SensorHub`][hub::SensorHub]: normalizes driver readings into
//!   [`SensorSample`][dohyo_types::SensorSample]s with staleness detection and
//!   per-sensor health diagnostics.
//! - [`motor`] – [`WheelMotor`][motor::WheelMotor] and
//!   [`DriveTrain`][motor::DriveTrain]: applies a
//!   [`MotorCommand`][dohyo_types::MotorCommand] to the two drive wheels.
//! - [`sim`] – in-process simulated sensors and motors for headless runs.

pub mod clock;
pub mod hub;
pub mod motor;
pub mod sensor;
pub mod sim;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use hub::{SensorHealth, SensorHub};
pub use motor::{DriveTrain, WheelMotor};
pub use sensor::Sensor;
