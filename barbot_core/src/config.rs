//! Core-side configuration structs.
//!
//! Mirrors the relevant parts of `barbot_config` without pulling serde into
//! the control loop; `conversions.rs` bridges the two.

/// Station positions along the rail, in millimetres from the homed zero.
#[derive(Debug, Clone)]
pub struct RailGeometry {
    pub first_port_mm: f32,
    pub port_pitch_mm: f32,
    pub port_count: u8,
    pub mixer_mm: f32,
    pub crusher_mm: f32,
    pub sugar_mm: f32,
    pub max_position_mm: f32,
}

impl Default for RailGeometry {
    fn default() -> Self {
        Self {
            first_port_mm: 68.0,
            port_pitch_mm: 50.0,
            port_count: 12,
            mixer_mm: 683.0,
            crusher_mm: 803.0,
            sugar_mm: -97.0,
            max_position_mm: 803.0,
        }
    }
}

impl RailGeometry {
    /// Rail position of a pump port.
    pub fn port_mm(&self, port: u8) -> f32 {
        self.first_port_mm + self.port_pitch_mm * f32::from(port)
    }
}

#[derive(Debug, Clone)]
pub struct MotionCfg {
    pub microsteps: u32,
    pub fullsteps_per_mm: f32,
    pub max_speed_mm_s: f32,
    pub max_accel_mm_s2: f32,
    pub homing_speed_mm_s: f32,
    pub homing_sweep_mm: f32,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            microsteps: 4,
            fullsteps_per_mm: 5.0,
            max_speed_mm_s: 100.0,
            max_accel_mm_s2: 20.0,
            homing_speed_mm_s: 10.0,
            homing_sweep_mm: 2000.0,
        }
    }
}

/// Depletion window: the weight must grow by `min_delta_g` within `window_ms`
/// or the ingredient is declared empty.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackWindow {
    pub window_ms: u64,
    pub min_delta_g: f32,
}

#[derive(Debug, Clone)]
pub struct MachineCfg {
    pub rail: RailGeometry,
    pub motion: MotionCfg,
    /// A glass lighter than this counts as removed.
    pub glass_min_weight_g: f32,
    pub draft_window: FeedbackWindow,
    /// Crushing is slower than pumping, hence the wider window.
    pub ice_window: FeedbackWindow,
    pub sugar_window: FeedbackWindow,
    /// Cadence for slow satellite polls (mixer, straw, health checks).
    pub child_poll_ms: u64,
    pub pump_power_percent: u8,
    pub pwm_bits: u8,
}

impl Default for MachineCfg {
    fn default() -> Self {
        Self {
            rail: RailGeometry::default(),
            motion: MotionCfg::default(),
            glass_min_weight_g: 300.0,
            draft_window: FeedbackWindow {
                window_ms: 3000,
                min_delta_g: 20.0,
            },
            ice_window: FeedbackWindow {
                window_ms: 5000,
                min_delta_g: 10.0,
            },
            sugar_window: FeedbackWindow {
                window_ms: 3000,
                min_delta_g: 5.0,
            },
            child_poll_ms: 100,
            pump_power_percent: 80,
            pwm_bits: 10,
        }
    }
}

impl MachineCfg {
    /// PWM duty for the configured pump power.
    pub fn pump_pwm(&self) -> u32 {
        (u32::from(self.pump_power_percent) * (1u32 << self.pwm_bits)) / 100
    }
}

#[cfg(test)]
mod tests {
    use super::MachineCfg;

    #[test]
    fn pump_pwm_scales_with_percent() {
        let mut cfg = MachineCfg::default();
        cfg.pump_power_percent = 100;
        assert_eq!(cfg.pump_pwm(), 1024);
        cfg.pump_power_percent = 50;
        assert_eq!(cfg.pump_pwm(), 512);
    }
}
