//! [`SafetyGate`] – single interception point between decision and drive.
//!
//! Each cycle the control loop calls [`SafetyGate::evaluate`] before the
//! state machine runs, and passes the state machine's intent through
//! [`SafetyGate::finalize`] afterwards.  `finalize` is the only way a
//! command reaches the drive train, so an active edge always wins, including
//! in the very cycle the edge is first seen.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use dohyo_kernel::{ActuatorMapper, MapperConfig, SafetyConfig, SafetyGate, SafetyMonitor};
//! use dohyo_types::{Intent, SampleSet, SampleValue, SensorId, SensorSample};
//!
//! let mut gate = SafetyGate::new(
//!     SafetyMonitor::new(SafetyConfig::default()),
//!     ActuatorMapper::new(MapperConfig::default()),
//! );
//!
//! let now = Duration::ZERO;
//! let on_edge = SampleSet::empty(now).with(SensorSample::fresh(
//!     SensorId::EdgeLeft,
//!     SampleValue::Reflectance(2.0),
//!     now,
//! ));
//! let status = gate.evaluate(&on_edge);
//!
//! // The push is discarded; the retreat goes out instead.
//! let cmd = gate.finalize(Intent::DriveMax, &status);
//! assert_eq!(cmd, gate.mapper().retreat_command());
//! ```

use dohyo_types::{Intent, MotorCommand, SafetyStatus, SampleSet};
use tracing::{debug, warn};

use crate::mapper::ActuatorMapper;
use crate::safety::SafetyMonitor;

/// Couples the [`SafetyMonitor`] with the [`ActuatorMapper`].
#[derive(Debug)]
pub struct SafetyGate {
    monitor: SafetyMonitor,
    mapper: ActuatorMapper,
    overrides: u64,
}

impl SafetyGate {
    pub fn new(monitor: SafetyMonitor, mapper: ActuatorMapper) -> Self {
        Self {
            monitor,
            mapper,
            overrides: 0,
        }
    }

    pub fn mapper(&self) -> &ActuatorMapper {
        &self.mapper
    }

    pub fn monitor(&self) -> &SafetyMonitor {
        &self.monitor
    }

    /// Number of cycles in which the override replaced the intent.
    pub fn overrides(&self) -> u64 {
        self.overrides
    }

    /// Evaluate this cycle's safety conditions.
    pub fn evaluate(&mut self, samples: &SampleSet) -> SafetyStatus {
        self.monitor.evaluate(samples)
    }

    /// Map `intent` to the command that will actually be applied.
    pub fn finalize(&mut self, intent: Intent, status: &SafetyStatus) -> MotorCommand {
        let override_active = status.override_active();
        if override_active {
            self.overrides += 1;
            if intent.is_offensive() {
                warn!(?intent, "offensive intent discarded at ring edge");
            } else {
                debug!(?intent, "intent replaced by edge retreat");
            }
        }
        let command = self.mapper.map(intent, override_active);
        debug_assert!(command.is_within_limits());
        command
    }
}
