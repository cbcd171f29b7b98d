//! Control state machine – Search / LockOn / Approach / Push / Recovery.
//!
//! [`StateMachine::step`] runs once per cycle after safety evaluation and
//! target tracking.  It applies at most one transition and then emits the
//! intent of the state it ended up in, so the intent always belongs to the
//! post-transition state.
//!
//! Safety preemption beats every other rule: an edge or an orientation
//! instability forces `Recovery` from any state, and re-entering `Recovery`
//! while already in it restarts the recovery timer.
//!
//! All timers (time in state, contact-absent time, steering PID memory) are
//! reset on state entry and advance by the cycle's `dt`.

use std::time::Duration;

use dohyo_types::{Intent, RobotState, RotationDirection, SafetyStatus, TargetEstimate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::steering::SteeringPid;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Which rule wins in Approach and Push when the target disappears while
/// the bumpers still report contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossPriority {
    /// A lost target sends the machine back to Search regardless of contact.
    #[default]
    TargetLoss,
    /// Confirmed contact keeps pushing; a lost target only counts once the
    /// contact has been gone for the debounce interval.
    Contact,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MachineConfig {
    /// Widest bearing at which Search commits to LockOn.
    pub lock_tolerance_deg: f32,
    pub alignment_tolerance_deg: f32,
    /// Bearing beyond which Approach falls back to LockOn.
    pub drift_tolerance_deg: f32,
    pub contact_debounce: Duration,
    pub loss_priority: LossPriority,
    pub lockon_bypass: bool,
    pub push_timeout: Option<Duration>,
    pub approach_power: f32,
    pub steer_kp: f32,
    pub steer_ki: f32,
    pub steer_kd: f32,
    pub steer_limit: f32,
    pub recovery_reverse: Duration,
    pub recovery_rotate: Duration,
    /// Rotation used when no single edge side is known.
    pub recovery_direction: RotationDirection,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            lock_tolerance_deg: 180.0,
            alignment_tolerance_deg: 10.0,
            drift_tolerance_deg: 20.0,
            contact_debounce: Duration::from_millis(60),
            loss_priority: LossPriority::TargetLoss,
            lockon_bypass: true,
            push_timeout: None,
            approach_power: 30.0,
            steer_kp: 0.8,
            steer_ki: 0.0,
            steer_kd: 0.05,
            steer_limit: 20.0,
            recovery_reverse: Duration::from_millis(500),
            recovery_rotate: Duration::from_millis(600),
            recovery_direction: RotationDirection::Clockwise,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Step input / output
// ────────────────────────────────────────────────────────────────────────────

/// Everything the machine looks at in one cycle.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub target: &'a TargetEstimate,
    /// Any valid contact sample reads pressed.
    pub contact: bool,
    pub safety: &'a SafetyStatus,
    /// Time since the previous cycle.
    pub dt: Duration,
}

/// Why a transition fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    EdgeDetected,
    OrientationUnstable,
    TargetAcquired,
    /// Acquired already aligned; LockOn skipped.
    AlignedOnAcquire,
    Aligned,
    TargetLost,
    ContactConfirmed,
    BearingDrift,
    ContactLost,
    PushTimeout,
    RecoveryComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: RobotState,
    pub to: RobotState,
    pub reason: TransitionReason,
}

/// Result of one [`StateMachine::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// State after this cycle's transition, if any.
    pub state: RobotState,
    pub intent: Intent,
    pub transition: Option<Transition>,
    /// Steering PID output, zero outside Approach.
    pub steer: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// StateMachine
// ────────────────────────────────────────────────────────────────────────────

/// Consecutive cycles without contact needed before Push lets go.
const MIN_ABSENT_CYCLES: u32 = 2;

#[derive(Debug)]
pub struct StateMachine {
    config: MachineConfig,
    state: RobotState,
    time_in_state: Duration,
    contact_absent: Duration,
    absent_cycles: u32,
    recovery_direction: RotationDirection,
    steering: SteeringPid,
    last_bearing: Option<f32>,
}

impl StateMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            state: RobotState::Search,
            time_in_state: Duration::ZERO,
            contact_absent: Duration::ZERO,
            absent_cycles: 0,
            recovery_direction: config.recovery_direction,
            steering: SteeringPid::new(
                config.steer_kp,
                config.steer_ki,
                config.steer_kd,
                config.steer_limit,
            ),
            last_bearing: None,
            config,
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn state(&self) -> RobotState {
        self.state
    }

    pub fn time_in_state(&self) -> Duration {
        self.time_in_state
    }

    /// Bearing of the most recent detection, kept across states.
    pub fn last_bearing(&self) -> Option<f32> {
        self.last_bearing
    }

    /// Advance by one cycle.
    pub fn step(&mut self, input: &StepInput<'_>) -> Decision {
        if input.target.present {
            self.last_bearing = Some(input.target.bearing_deg);
        }

        let transition = match self.preemption(input.safety) {
            Some((reason, direction)) => {
                self.recovery_direction = direction;
                Some(self.enter(RobotState::Recovery, reason))
            }
            None => {
                self.time_in_state += input.dt;
                self.next(input).map(|(to, reason)| self.enter(to, reason))
            }
        };

        let (intent, steer) = self.behavior(input);
        debug!(state = %self.state, ?intent, steer, "decision");
        Decision {
            state: self.state,
            intent,
            transition,
            steer,
        }
    }

    fn preemption(&self, safety: &SafetyStatus) -> Option<(TransitionReason, RotationDirection)> {
        if safety.edge_detected {
            let direction = safety
                .edge_side
                .and_then(|side| side.away())
                .unwrap_or(self.config.recovery_direction);
            Some((TransitionReason::EdgeDetected, direction))
        } else if safety.orientation_unstable {
            Some((TransitionReason::OrientationUnstable, self.config.recovery_direction))
        } else {
            None
        }
    }

    /// The non-preemptive transition rule of the current state.
    fn next(&mut self, input: &StepInput<'_>) -> Option<(RobotState, TransitionReason)> {
        let c = &self.config;
        let target = input.target;
        let bearing = target.bearing_deg.abs();
        let lost = !target.present;

        match self.state {
            RobotState::Search => {
                if lost {
                    None
                } else if c.lockon_bypass && bearing <= c.alignment_tolerance_deg {
                    Some((RobotState::Approach, TransitionReason::AlignedOnAcquire))
                } else if bearing <= c.lock_tolerance_deg {
                    Some((RobotState::LockOn, TransitionReason::TargetAcquired))
                } else {
                    None
                }
            }
            RobotState::LockOn => {
                if lost {
                    Some((RobotState::Search, TransitionReason::TargetLost))
                } else if bearing <= c.alignment_tolerance_deg {
                    Some((RobotState::Approach, TransitionReason::Aligned))
                } else {
                    None
                }
            }
            RobotState::Approach => {
                let to_search = lost.then_some((RobotState::Search, TransitionReason::TargetLost));
                let to_push = input
                    .contact
                    .then_some((RobotState::Push, TransitionReason::ContactConfirmed));
                let first = match c.loss_priority {
                    LossPriority::TargetLoss => to_search.or(to_push),
                    LossPriority::Contact => to_push.or(to_search),
                };
                first.or_else(|| {
                    (bearing > c.drift_tolerance_deg)
                        .then_some((RobotState::LockOn, TransitionReason::BearingDrift))
                })
            }
            RobotState::Push => {
                if input.contact {
                    self.contact_absent = Duration::ZERO;
                    self.absent_cycles = 0;
                } else {
                    self.contact_absent += input.dt;
                    self.absent_cycles += 1;
                }
                if let Some(limit) = c.push_timeout
                    && self.time_in_state >= limit
                {
                    self.recovery_direction = c.recovery_direction;
                    return Some((RobotState::Recovery, TransitionReason::PushTimeout));
                }
                // One long (overrun) cycle alone never counts as a lost contact.
                let contact_lost = !input.contact
                    && self.absent_cycles >= MIN_ABSENT_CYCLES
                    && self.contact_absent >= c.contact_debounce;
                match c.loss_priority {
                    LossPriority::TargetLoss if lost => {
                        Some((RobotState::Search, TransitionReason::TargetLost))
                    }
                    _ if contact_lost && lost => {
                        Some((RobotState::Search, TransitionReason::TargetLost))
                    }
                    _ if contact_lost => Some((RobotState::Approach, TransitionReason::ContactLost)),
                    _ => None,
                }
            }
            RobotState::Recovery => (self.time_in_state >= c.recovery_reverse + c.recovery_rotate)
                .then_some((RobotState::Search, TransitionReason::RecoveryComplete)),
        }
    }

    fn enter(&mut self, to: RobotState, reason: TransitionReason) -> Transition {
        let from = self.state;
        if from == to {
            debug!(state = %to, ?reason, "state re-entered");
        } else {
            info!(%from, %to, ?reason, last_bearing = ?self.last_bearing, "state transition");
        }
        self.state = to;
        self.time_in_state = Duration::ZERO;
        self.contact_absent = Duration::ZERO;
        self.absent_cycles = 0;
        self.steering.reset();
        Transition { from, to, reason }
    }

    fn behavior(&mut self, input: &StepInput<'_>) -> (Intent, f32) {
        let bearing = input.target.bearing_deg;
        match self.state {
            RobotState::Search => (Intent::RotateSearch, 0.0),
            RobotState::LockOn => (Intent::RotateToBearing { error_deg: bearing }, 0.0),
            RobotState::Approach => {
                let steer = self.steering.update(bearing, input.dt);
                (
                    Intent::DriveForward {
                        power: self.config.approach_power,
                        steer,
                    },
                    steer,
                )
            }
            RobotState::Push => (Intent::DriveMax, 0.0),
            RobotState::Recovery => {
                if self.time_in_state < self.config.recovery_reverse {
                    (Intent::Reverse, 0.0)
                } else {
                    (
                        Intent::RotateAway {
                            direction: self.recovery_direction,
                        },
                        0.0,
                    )
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
