//! Heating power calculator: the feedback function used by the heat
//! controller.  Wraps [`pid_iterate`] with the plate's gains and a minimum
//! duty floor, since a relay cannot usefully switch for a sliver of a tick.

use super::pid::{pid_iterate, PidParams, PidState};
use crate::config::PlateConfig;

/// Stateful power calculator; one integrator per heating run.
#[derive(Debug, Clone)]
pub struct PowerCalculator {
    params: PidParams,
    floor_percent: f32,
    state: PidState,
}

impl PowerCalculator {
    pub fn new(params: PidParams, floor_percent: f32) -> Self {
        Self {
            params,
            floor_percent,
            state: PidState::default(),
        }
    }

    pub fn from_config(config: &PlateConfig) -> Self {
        Self::new(
            PidParams {
                kp: config.pid_kp,
                ki: config.pid_ki,
                kd: config.pid_kd,
                output_min: 0.0,
                output_max: config.max_power_percent,
            },
            config.min_power_percent,
        )
    }

    /// Power in percent, `[0, max]`; results below the floor become 0.
    pub fn compute(&mut self, actual_c: f32, target_c: f32, dt_secs: f32) -> f32 {
        self.state = pid_iterate(
            &self.params,
            PidState {
                actual: actual_c,
                target: target_c,
                time_delta: dt_secs,
                ..self.state
            },
        );
        if self.state.output < self.floor_percent {
            0.0
        } else {
            self.state.output
        }
    }

    pub fn reset(&mut self) {
        self.state = PidState::default();
    }
}
