use serde::{Deserialize, Serialize};

/// Numeric knobs shared by the systems.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Ticks between diffusion passes.
    pub disperse_interval: u64,
    /// Gravity used by projectile trajectories; negative values pull toward higher rows.
    pub gravity: f64,
    /// Milliseconds of projectile age that make up one unit of trajectory time.
    pub trajectory_divisor_ms: f64,
    /// Distance in cells at which homing projectiles hit their target.
    pub homing_radius: f64,
    /// Rotor speed gained per unit of fluid flowing into a turbine.
    pub turbine_flow_gain: f64,
    /// Powers every consumer regardless of supply.
    pub pause_power_consumption: bool,
    /// Light poured into the top row, if the level is open to the sky.
    pub surface_light: Option<f64>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            disperse_interval: 6,
            gravity: -100.0,
            trajectory_divisor_ms: 10_000.0,
            homing_radius: 4.0,
            turbine_flow_gain: 0.01,
            pause_power_consumption: false,
            surface_light: Some(350.0),
        }
    }
}
