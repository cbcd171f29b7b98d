//! Bearing-error PID used to steer while approaching.
//!
//! The set-point is always a bearing of 0°, so the controller is fed the
//! bearing error directly.  A positive error (target to the right) yields a
//! positive steer, which the mapper turns into a faster left wheel.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use dohyo_runtime::steering::SteeringPid;
//!
//! let mut pid = SteeringPid::new(0.8, 0.0, 0.0, 20.0);
//! let steer = pid.update(10.0, Duration::from_millis(20));
//! assert!((steer - 8.0).abs() < 1e-4);
//! ```

use std::time::Duration;

/// PID on bearing error with a symmetric output limit.
#[derive(Debug, Clone)]
pub struct SteeringPid {
    kp: f32,
    ki: f32,
    kd: f32,
    limit: f32,
    integral: f32,
    last_error: Option<f32>,
}

impl SteeringPid {
    /// Output is clamped to `[-limit, limit]`.
    pub fn new(kp: f32, ki: f32, kd: f32, limit: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            limit: limit.abs(),
            integral: 0.0,
            last_error: None,
        }
    }

    pub fn limit(&self) -> f32 {
        self.limit
    }

    /// Compute the steer correction for `error_deg` after `dt`.
    ///
    /// With a zero `dt` only the proportional term is applied and the
    /// integral/derivative memory is left untouched.
    pub fn update(&mut self, error_deg: f32, dt: Duration) -> f32 {
        if !error_deg.is_finite() {
            return 0.0;
        }
        let dt = dt.as_secs_f32();
        let p = self.kp * error_deg;
        if dt <= 0.0 {
            return p.clamp(-self.limit, self.limit);
        }

        // Integral term with anti-windup clamping.
        self.integral += error_deg * dt;
        let i = (self.ki * self.integral).clamp(-self.limit, self.limit);
        if self.ki.abs() > f32::EPSILON {
            self.integral = i / self.ki;
        }

        let d = match self.last_error {
            Some(prev) => self.kd * (error_deg - prev) / dt,
            None => 0.0,
        };
        self.last_error = Some(error_deg);

        (p + i + d).clamp(-self.limit, self.limit)
    }

    /// Forget integral and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: Duration = Duration::from_millis(20);

    #[test]
    fn steers_toward_the_target_side() {
        let mut pid = SteeringPid::new(0.8, 0.0, 0.0, 20.0);
        assert!(pid.update(5.0, DT) > 0.0);
        assert!(pid.update(-5.0, DT) < 0.0);
        assert_eq!(pid.update(0.0, DT), 0.0);
    }

    #[test]
    fn output_is_limited() {
        let mut pid = SteeringPid::new(5.0, 0.0, 0.0, 20.0);
        assert_eq!(pid.update(90.0, DT), 20.0);
        assert_eq!(pid.update(-90.0, DT), -20.0);
    }

    #[test]
    fn derivative_needs_history() {
        let mut pid = SteeringPid::new(0.0, 0.0, 0.1, 50.0);
        assert_eq!(pid.update(10.0, DT), 0.0);
        // (4 - 10) / 0.02 * 0.1 = -30
        assert!((pid.update(4.0, DT) + 30.0).abs() < 1e-3);
        pid.reset();
        assert_eq!(pid.update(4.0, DT), 0.0);
    }

    #[test]
    fn integral_does_not_wind_up_past_limit() {
        let mut pid = SteeringPid::new(0.0, 10.0, 0.0, 5.0);
        for _ in 0..100 {
            pid.update(30.0, DT);
        }
        // A single opposite error pulls the output back immediately.
        let out = pid.update(-30.0, DT);
        assert!(out < 5.0, "integral wound up: {out}");
    }

    #[test]
    fn zero_dt_is_proportional_only() {
        let mut pid = SteeringPid::new(0.5, 1.0, 1.0, 20.0);
        assert!((pid.update(10.0, Duration::ZERO) - 5.0).abs() < 1e-4);
        assert_eq!(pid.update(f32::NAN, DT), 0.0);
    }
}
