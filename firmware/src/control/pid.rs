//! PID arithmetic primitive.
//!
//! A pure function over explicit state, so callers own the integrator and
//! can reset it per heating run.

/// Gains and output limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidParams {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    pub output_min: f32,
    pub output_max: f32,
}

/// Inputs and carried state for one iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidState {
    pub actual: f32,
    pub target: f32,
    /// Seconds since the previous iteration.
    pub time_delta: f32,
    pub previous_error: f32,
    pub integral: f32,
    pub output: f32,
}

/// Run one PID iteration and return the updated state.
pub fn pid_iterate(params: &PidParams, mut state: PidState) -> PidState {
    let error = state.target - state.actual;
    let dt = state.time_delta;

    // Proportional
    let p = params.kp * error;

    // Integral (with anti-windup)
    let integral = state.integral + error * dt;
    let i = params.ki * integral;

    // Derivative
    let derivative = if dt > 0.0 {
        (error - state.previous_error) / dt
    } else {
        0.0
    };
    let d = params.kd * derivative;

    let output = (p + i + d).clamp(params.output_min, params.output_max);

    // Anti-windup: if output is saturated, stop integrating
    state.integral = if output >= params.output_max || output <= params.output_min {
        state.integral
    } else {
        integral
    };
    state.previous_error = error;
    state.output = output;
    state
}
