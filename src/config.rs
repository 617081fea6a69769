use serde::{Deserialize, Serialize};

use crate::error::{Result, TexError};

/// Tunables of the texture matcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchConfig {
    /// Seed for the `StdRng` built by `TextureMatcher::from_config`.
    pub seed: u64,
    /// Consecutive rejected trials allowed, per grain in the phase.
    pub bad_try_factor: usize,
    /// Total trials allowed, per grain in the phase.
    pub iteration_factor: usize,
    /// Absolute trial cap. Overrides both factors: `max_iterations / 10`
    /// bad tries and `max_iterations` trials.
    pub max_iterations: Option<usize>,
    /// Probability of a swap-out move; a switch is tried otherwise.
    pub swap_probability: f64,
    pub initial_neighbor_capacity: usize,
    /// Iterations between debug progress lines.
    pub progress_interval: usize,
    pub record_trace: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            bad_try_factor: 10,
            iteration_factor: 1000,
            max_iterations: None,
            swap_probability: 0.5,
            initial_neighbor_capacity: 16,
            progress_interval: 10_000,
            record_trace: false,
        }
    }
}

impl MatchConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.swap_probability) {
            return Err(TexError::InvalidInput(format!(
                "swap_probability must lie in [0, 1], got {}",
                self.swap_probability
            )));
        }
        if self.bad_try_factor == 0 || self.iteration_factor == 0 {
            return Err(TexError::invalid_input(
                "bad_try_factor and iteration_factor must be non-zero",
            ));
        }
        if self.max_iterations == Some(0) {
            return Err(TexError::invalid_input("max_iterations must be non-zero when set"));
        }
        if self.initial_neighbor_capacity == 0 || self.progress_interval == 0 {
            return Err(TexError::invalid_input(
                "initial_neighbor_capacity and progress_interval must be non-zero",
            ));
        }
        Ok(())
    }

    /// `(bad try cap, iteration cap)` for a phase of `num_grains` grains.
    pub fn trial_caps(&self, num_grains: usize) -> (usize, usize) {
        match self.max_iterations {
            Some(max) => (max / 10, max),
            None => (
                self.bad_try_factor.saturating_mul(num_grains),
                self.iteration_factor.saturating_mul(num_grains),
            ),
        }
    }
}
