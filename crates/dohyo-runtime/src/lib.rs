//! `dohyo-runtime` – the control core of the sumo robot.
//!
//! Wires the sensor hub, target tracker, safety gate and state machine into
//! one fixed-rate loop.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: runs the
//!   snapshot → safety → track → decide → gate → drive → record cycle at a
//!   fixed period, and reports each cycle as a
//!   [`CycleReport`][control_loop::CycleReport].
//! - [`state_machine`] – [`StateMachine`][state_machine::StateMachine]: the
//!   Search / LockOn / Approach / Push / Recovery behaviour, with safety
//!   preemption, the configurable [`LossPriority`][state_machine::LossPriority]
//!   and the LockOn bypass.
//! - [`steering`] – [`SteeringPid`][steering::SteeringPid]: bearing-error PID
//!   used while approaching.
//! - [`config`] – [`ControlConfig`][config::ControlConfig]: TOML
//!   configuration with `DOHYO_*` environment overrides and validation.
//! - [`recorder`] – [`CycleSink`][recorder::CycleSink] with JSON-lines and
//!   in-memory implementations.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing].
//!
//! # Safety gating
//!
//! Every command reaches the drive train through
//! [`SafetyGate::finalize`][dohyo_kernel::SafetyGate::finalize].  The gate is
//! re-exported here so callers can inspect it without depending on
//! `dohyo-kernel` directly.

pub mod config;
pub mod control_loop;
pub mod recorder;
pub mod state_machine;
pub mod steering;
pub mod telemetry;

pub use config::{ConfigError, ControlConfig};
pub use control_loop::{ControlLoop, CycleReport, RunSummary};
pub use recorder::{CycleRecord, CycleSink, JsonlRecorder, MemoryRecorder};
pub use state_machine::{
    Decision, LossPriority, MachineConfig, StateMachine, StepInput, Transition, TransitionReason,
};
pub use steering::SteeringPid;
pub use telemetry::init_tracing;

pub use dohyo_kernel::SafetyGate;
