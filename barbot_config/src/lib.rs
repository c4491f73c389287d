#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the drink-machine control core.
//!
//! Everything that must survive a power cycle lives here: rail geometry,
//! motion limits, scale calibration and the per-ingredient feedback windows.
//! The structs are deserialized from TOML and validated before use.

use std::path::Path;

use serde::Deserialize;

/// Rail geometry in millimetres, measured from the homed zero position.
///
/// The home switch sits `home_offset_mm` left of the rail origin used during
/// assembly, so station positions are given relative to the homed zero.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RailCfg {
    pub home_offset_mm: f32,
    /// Center of pump port 0; ports are spaced `port_pitch_mm` apart.
    pub first_port_mm: f32,
    pub port_pitch_mm: f32,
    pub port_count: u8,
    pub mixer_mm: f32,
    pub crusher_mm: f32,
    pub sugar_mm: f32,
    /// Hard upper bound for any committed target.
    pub max_position_mm: f32,
}

impl Default for RailCfg {
    fn default() -> Self {
        Self {
            home_offset_mm: 97.0,
            first_port_mm: 68.0,
            port_pitch_mm: 50.0,
            port_count: 12,
            mixer_mm: 683.0,
            crusher_mm: 803.0,
            sugar_mm: -97.0,
            // the crusher is the last station on the rail
            max_position_mm: 803.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    /// Electrical micro-steps per full motor step.
    pub microsteps: u32,
    pub fullsteps_per_mm: f32,
    pub max_speed_mm_s: f32,
    pub max_accel_mm_s2: f32,
    /// Constant creep speed for the fine homing phase.
    pub homing_speed_mm_s: f32,
    /// How far past the expected rail length the rough homing sweep may go.
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

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScaleCfg {
    /// Raw counts per gram; sign encodes load-cell orientation.
    pub calibration: f32,
    /// Raw counts at empty platform.
    pub offset: f32,
    /// A glass lighter than this counts as removed.
    pub glass_min_weight_g: f32,
    /// Error out when no fresh sample arrived within this window.
    pub data_timeout_ms: u64,
    /// Minimum spacing between has-new-data polls, to keep the bus free.
    pub poll_interval_ms: u64,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            calibration: -1040.0,
            offset: -123_865.0,
            glass_min_weight_g: 300.0,
            data_timeout_ms: 1000,
            poll_interval_ms: 3,
        }
    }
}

/// Depletion window for one ingredient class: if the weight fails to grow by
/// `min_delta_g` within `window_ms`, the ingredient is considered empty.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FeedbackWindow {
    pub window_ms: u64,
    pub min_delta_g: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngredientCfg {
    pub draft: FeedbackWindow,
    /// Crushing is slower than pumping, so the window is wider.
    pub ice: FeedbackWindow,
    pub sugar: FeedbackWindow,
}

impl Default for IngredientCfg {
    fn default() -> Self {
        Self {
            draft: FeedbackWindow {
                window_ms: 3000,
                min_delta_g: 20.0,
            },
            ice: FeedbackWindow {
                window_ms: 5000,
                min_delta_g: 10.0,
            },
            sugar: FeedbackWindow {
                window_ms: 3000,
                min_delta_g: 5.0,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PumpCfg {
    /// Default pump drive level in percent of full PWM.
    pub power_percent: u8,
    /// PWM resolution in bits; duty = percent * 2^bits / 100.
    pub pwm_bits: u8,
}

impl Default for PumpCfg {
    fn default() -> Self {
        Self {
            power_percent: 80,
            pwm_bits: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtocolCfg {
    /// Send an unsolicited STATUS line after this long without output.
    pub heartbeat_ms: u64,
    /// Poll cadence for slow satellite queries (mixer/straw/health checks).
    pub child_poll_ms: u64,
}

impl Default for ProtocolCfg {
    fn default() -> Self {
        Self {
            heartbeat_ms: 300,
            child_poll_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rail: RailCfg,
    pub motion: MotionCfg,
    pub scale: ScaleCfg,
    pub ingredients: IngredientCfg,
    pub pump: PumpCfg,
    pub protocol: ProtocolCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("reading config {}: {e}", path.display()))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parsing config: {e}"))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    /// Reject configs that cannot drive the machine safely.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.motion.microsteps == 0 {
            eyre::bail!("motion.microsteps must be > 0");
        }
        if !(self.motion.fullsteps_per_mm > 0.0) {
            eyre::bail!("motion.fullsteps_per_mm must be > 0");
        }
        if !(self.motion.max_speed_mm_s > 0.0) || !(self.motion.max_accel_mm_s2 > 0.0) {
            eyre::bail!("motion speed and acceleration must be > 0");
        }
        if !(self.motion.homing_speed_mm_s > 0.0) || !(self.motion.homing_sweep_mm > 0.0) {
            eyre::bail!("homing speed and sweep must be > 0");
        }
        if self.rail.port_count == 0 {
            eyre::bail!("rail.port_count must be > 0");
        }
        if !(self.rail.port_pitch_mm > 0.0) {
            eyre::bail!("rail.port_pitch_mm must be > 0");
        }
        if self.rail.max_position_mm < self.rail.first_port_mm {
            eyre::bail!("rail.max_position_mm lies before the first pump port");
        }
        if self.scale.calibration == 0.0 {
            eyre::bail!("scale.calibration must be non-zero");
        }
        if self.scale.data_timeout_ms == 0 {
            eyre::bail!("scale.data_timeout_ms must be >= 1");
        }
        if !(self.scale.glass_min_weight_g > 0.0) {
            eyre::bail!("scale.glass_min_weight_g must be > 0");
        }
        for (name, w) in [
            ("draft", &self.ingredients.draft),
            ("ice", &self.ingredients.ice),
            ("sugar", &self.ingredients.sugar),
        ] {
            if w.window_ms == 0 {
                eyre::bail!("ingredients.{name}.window_ms must be >= 1");
            }
            if !(w.min_delta_g > 0.0) {
                eyre::bail!("ingredients.{name}.min_delta_g must be > 0");
            }
        }
        if self.pump.power_percent == 0 || self.pump.power_percent > 100 {
            eyre::bail!("pump.power_percent must be in 1..=100");
        }
        if self.pump.pwm_bits == 0 || self.pump.pwm_bits > 16 {
            eyre::bail!("pump.pwm_bits must be in 1..=16");
        }
        if self.protocol.heartbeat_ms == 0 {
            eyre::bail!("protocol.heartbeat_ms must be >= 1");
        }
        if self.protocol.child_poll_ms == 0 {
            eyre::bail!("protocol.child_poll_ms must be >= 1");
        }
        Ok(())
    }

    /// Rail position of a pump port, in millimetres.
    pub fn port_position_mm(&self, port: u8) -> f32 {
        self.rail.first_port_mm + self.rail.port_pitch_mm * f32::from(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        cfg.validate().expect("default config must validate");
        assert_eq!(cfg.rail.port_count, 12);
        assert_eq!(cfg.motion.microsteps, 4);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = load_toml("").expect("empty toml parses");
        assert_eq!(cfg.scale.glass_min_weight_g, 300.0);
        assert_eq!(cfg.ingredients.ice.window_ms, 5000);
    }

    #[test]
    fn port_positions_follow_pitch() {
        let cfg = Config::default();
        assert_eq!(cfg.port_position_mm(0), 68.0);
        assert_eq!(cfg.port_position_mm(3), 68.0 + 3.0 * 50.0);
    }
}
