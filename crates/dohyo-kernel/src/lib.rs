//! `dohyo-kernel` – Safety & Actuation
//!
//! The part of the control core that does not decide strategy; it enforces
//! the one rule that outranks strategy (stay on the ring) and turns intents
//! into wheel powers.
//!
//! # Modules
//!
//! - [`safety`] – [`SafetyMonitor`][safety::SafetyMonitor]: evaluated every
//!   cycle regardless of state; reports edge detection and debounced
//!   orientation instability as a [`SafetyStatus`][dohyo_types::SafetyStatus].
//! - [`mapper`] – [`ActuatorMapper`][mapper::ActuatorMapper]: pure
//!   translation of an [`Intent`][dohyo_types::Intent] into a clamped
//!   [`MotorCommand`][dohyo_types::MotorCommand], replaced by the fixed
//!   retreat command whenever the safety override is active.
//! - [`gate`] – [`SafetyGate`][gate::SafetyGate]: the single interception
//!   point between the state machine and the drive train.  Every command
//!   leaves the decision core through [`SafetyGate::finalize`][gate::SafetyGate::finalize].

pub mod gate;
pub mod mapper;
pub mod safety;

pub use gate::SafetyGate;
pub use mapper::{ActuatorMapper, MapperConfig};
pub use safety::{EdgePolarity, SafetyConfig, SafetyMonitor};
