//! `From` implementations bridging `barbot_config` types to core types.

use crate::config::{FeedbackWindow, MachineCfg, MotionCfg, RailGeometry};

impl From<&barbot_config::RailCfg> for RailGeometry {
    fn from(c: &barbot_config::RailCfg) -> Self {
        Self {
            first_port_mm: c.first_port_mm,
            port_pitch_mm: c.port_pitch_mm,
            port_count: c.port_count,
            mixer_mm: c.mixer_mm,
            crusher_mm: c.crusher_mm,
            sugar_mm: c.sugar_mm,
            max_position_mm: c.max_position_mm,
        }
    }
}

impl From<&barbot_config::MotionCfg> for MotionCfg {
    fn from(c: &barbot_config::MotionCfg) -> Self {
        Self {
            microsteps: c.microsteps,
            fullsteps_per_mm: c.fullsteps_per_mm,
            max_speed_mm_s: c.max_speed_mm_s,
            max_accel_mm_s2: c.max_accel_mm_s2,
            homing_speed_mm_s: c.homing_speed_mm_s,
            homing_sweep_mm: c.homing_sweep_mm,
        }
    }
}

impl From<&barbot_config::FeedbackWindow> for FeedbackWindow {
    fn from(c: &barbot_config::FeedbackWindow) -> Self {
        Self {
            window_ms: c.window_ms,
            min_delta_g: c.min_delta_g,
        }
    }
}

impl From<&barbot_config::Config> for MachineCfg {
    fn from(c: &barbot_config::Config) -> Self {
        Self {
            rail: (&c.rail).into(),
            motion: (&c.motion).into(),
            glass_min_weight_g: c.scale.glass_min_weight_g,
            draft_window: (&c.ingredients.draft).into(),
            ice_window: (&c.ingredients.ice).into(),
            sugar_window: (&c.ingredients.sugar).into(),
            child_poll_ms: c.protocol.child_poll_ms,
            pump_power_percent: c.pump.power_percent,
            pwm_bits: c.pump.pwm_bits,
        }
    }
}
