//! [`ControlLoop`] – the fixed-rate sense / decide / act cycle.
//!
//! One call to [`ControlLoop::cycle`] runs, strictly in order:
//!
//! ```text
//! snapshot → safety → track → state machine → gate finalize → drive → record
//! ```
//!
//! [`ControlLoop::run`] repeats that at the configured period until the
//! shutdown flag is raised or a cycle limit is reached, then stops the drive.
//! Nothing in a cycle is fatal: stale sensors degrade to "no signal",
//! actuator failures are reported in the [`CycleReport`], and recording
//! failures are logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dohyo_hal::{DriveTrain, SensorHub};
use dohyo_kernel::{ActuatorMapper, SafetyGate, SafetyMonitor};
use dohyo_perception::TargetTracker;
use dohyo_types::{
    DohyoError, Intent, MotorCommand, RobotState, SafetyStatus, SampleSet, SensorId,
    TargetEstimate,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::ControlConfig;
use crate::recorder::{CycleRecord, CycleSink};
use crate::state_machine::{StateMachine, StepInput, Transition};

/// Everything that happened in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// 1-based cycle index.
    pub cycle: u64,
    /// Monotonic time of the snapshot.
    pub at: Duration,
    /// Time since the previous cycle; the configured period on the first.
    pub dt: Duration,
    pub samples: SampleSet,
    pub safety: SafetyStatus,
    pub target: TargetEstimate,
    /// No valid front range reading this cycle, so no front detection.
    pub front_range_unusable: bool,
    /// No valid rear range reading this cycle, so no rear detection.
    pub rear_range_unusable: bool,
    pub contact: bool,
    pub state: RobotState,
    /// Intent chosen by the state machine, before the safety gate.
    pub intent: Intent,
    pub transition: Option<Transition>,
    pub steer: f32,
    /// Command actually sent to the drive train.
    pub command: MotorCommand,
    pub degraded: Vec<SensorId>,
    pub actuator_error: Option<DohyoError>,
}

/// Totals of a [`ControlLoop::run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub overruns: u64,
    pub actuator_failures: u64,
    pub safety_overrides: u64,
    pub final_state: RobotState,
}

pub struct ControlLoop {
    hub: SensorHub,
    tracker: TargetTracker,
    gate: SafetyGate,
    machine: StateMachine,
    drive: DriveTrain,
    sink: Option<Box<dyn CycleSink>>,
    period: Duration,
    run_id: Uuid,
    cycles: u64,
    last_at: Option<Duration>,
    recording_failed: bool,
}

impl ControlLoop {
    /// Wire up the control core from a validated configuration.
    pub fn new(config: &ControlConfig, hub: SensorHub, drive: DriveTrain) -> Self {
        Self {
            hub,
            tracker: TargetTracker::new(config.tracker_config()),
            gate: SafetyGate::new(
                SafetyMonitor::new(config.safety_config()),
                ActuatorMapper::new(config.mapper_config()),
            ),
            machine: StateMachine::new(config.machine_config()),
            drive,
            sink: None,
            period: config.cycle_period(),
            run_id: Uuid::new_v4(),
            cycles: 0,
            last_at: None,
            recording_failed: false,
        }
    }

    /// Send a [`CycleRecord`] of every cycle to `sink`.
    pub fn with_sink(mut self, sink: Box<dyn CycleSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn state(&self) -> RobotState {
        self.machine.state()
    }

    pub fn gate(&self) -> &SafetyGate {
        &self.gate
    }

    pub fn drive(&self) -> &DriveTrain {
        &self.drive
    }

    pub fn hub(&self) -> &SensorHub {
        &self.hub
    }

    /// Run exactly one control cycle at the hub clock's current time.
    #[instrument(level = "debug", skip(self), fields(cycle = self.cycles + 1))]
    pub fn cycle(&mut self) -> CycleReport {
        let samples = self.hub.snapshot();
        let at = samples.taken_at;
        let dt = match self.last_at {
            Some(prev) => at.saturating_sub(prev),
            None => self.period,
        };
        self.last_at = Some(at);
        self.cycles += 1;

        let safety = self.gate.evaluate(&samples);
        let tracked = self.tracker.track_with_diagnostics(&samples);
        let target = tracked.estimate;
        let contact = samples.contact_confirmed();

        let decision = self.machine.step(&StepInput {
            target: &target,
            contact,
            safety: &safety,
            dt,
        });
        let command = self.gate.finalize(decision.intent, &safety);

        let actuator_error = match self.drive.apply(&command) {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "actuator write failed; continuing");
                Some(e)
            }
        };

        let report = CycleReport {
            cycle: self.cycles,
            at,
            dt,
            samples,
            safety,
            target,
            front_range_unusable: tracked.front_unusable,
            rear_range_unusable: tracked.rear_unusable,
            contact,
            state: decision.state,
            intent: decision.intent,
            transition: decision.transition,
            steer: decision.steer,
            command,
            degraded: self.hub.degraded(),
            actuator_error,
        };
        debug!(
            state = %report.state,
            left = command.left,
            right = command.right,
            "cycle complete"
        );
        self.record(&report);
        report
    }

    /// Cycle at the configured period until `shutdown` is set or
    /// `max_cycles` have run, then stop the drive train.
    ///
    /// A cycle that overruns its deadline is logged and the schedule is
    /// re-based on the current time instead of trying to catch up.
    pub fn run(&mut self, shutdown: &AtomicBool, max_cycles: Option<u64>) -> RunSummary {
        let clock = Arc::clone(self.hub.clock());
        let mut summary = RunSummary::default();
        let mut deadline = clock.now();
        info!(
            run_id = %self.run_id,
            period_ms = self.period.as_millis() as u64,
            "control loop started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            if max_cycles.is_some_and(|limit| summary.cycles >= limit) {
                break;
            }
            let report = self.cycle();
            summary.cycles += 1;
            if report.actuator_error.is_some() {
                summary.actuator_failures += 1;
            }

            deadline += self.period;
            let now = clock.now();
            if now > deadline {
                warn!(
                    late_by_us = (now - deadline).as_micros() as u64,
                    cycle = report.cycle,
                    "cycle overran its deadline"
                );
                summary.overruns += 1;
                deadline = now;
            } else {
                std::thread::sleep(deadline - now);
            }
        }

        self.stop();
        summary.safety_overrides = self.gate.overrides();
        summary.final_state = self.machine.state();
        info!(
            cycles = summary.cycles,
            overruns = summary.overruns,
            final_state = %summary.final_state,
            "control loop stopped"
        );
        summary
    }

    /// Stop both wheels and flush the recorder.
    pub fn stop(&mut self) {
        if let Err(e) = self.drive.stop() {
            warn!(error = %e, "failed to stop drive train");
        }
        if let Some(sink) = self.sink.as_mut()
            && let Err(e) = sink.flush()
        {
            warn!(error = %e, "failed to flush cycle recorder");
        }
    }

    fn record(&mut self, report: &CycleReport) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        match sink.record(&CycleRecord::from_report(self.run_id, report)) {
            Ok(()) => self.recording_failed = false,
            Err(e) if !self.recording_failed => {
                warn!(error = %e, "cycle recording failed");
                self.recording_failed = true;
            }
            Err(e) => debug!(error = %e, "cycle recording still failing"),
        }
    }
}
