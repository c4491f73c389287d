//! Proxy for the weighing-scale board.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use barbot_traits::{Bus, Clock};

use super::SCALE_ADDRESS;

const CMD_HAS_NEW_DATA: u8 = 1;
const CMD_GET_DATA: u8 = 2;
const CMD_SET_LED_TYPE: u8 = 3;

const SEND_RETRIES: u32 = 3;
/// The load cell ADC is 24 bit; anything bigger is a corrupted frame.
const RAW_MAX: f32 = (1u32 << 25) as f32;

/// Outcome of one scale poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleUpdate {
    /// The bus transaction itself failed or returned garbage.
    CommunicationError,
    /// No fresh sample yet; not an error.
    NoData,
    /// A fresh sample was read; `weight()` reflects it.
    DataRead,
    /// No fresh sample arrived within the configured data window.
    Timeout,
}

#[derive(Debug, Clone)]
pub struct ScaleCfg {
    /// Raw counts per gram; sign encodes load-cell orientation.
    pub calibration: f32,
    /// Raw counts at empty platform.
    pub offset: f32,
    pub data_timeout_ms: u64,
    /// Minimum spacing between has-new-data polls to keep the bus free.
    pub poll_interval_ms: u64,
}

impl Default for ScaleCfg {
    fn default() -> Self {
        Self {
            calibration: -1040.0,
            offset: -123_865.0,
            data_timeout_ms: 1000,
            poll_interval_ms: 3,
        }
    }
}

pub struct ScaleBoard<B: Bus> {
    bus: Rc<RefCell<B>>,
    cfg: ScaleCfg,
    raw: f32,
    last_check_ms: u64,
    last_data_ms: u64,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

impl<B: Bus> ScaleBoard<B> {
    pub fn new(bus: Rc<RefCell<B>>, cfg: ScaleCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let epoch = clock.now();
        Self {
            bus,
            cfg,
            raw: 0.0,
            last_check_ms: 0,
            last_data_ms: 0,
            clock,
            epoch,
        }
    }

    /// Poll for a new sample. Paced by `poll_interval_ms` so a tight caller
    /// loop does not monopolize the bus.
    pub fn update(&mut self) -> ScaleUpdate {
        let now = self.clock.ms_since(self.epoch);
        if now < self.last_check_ms + self.cfg.poll_interval_ms {
            return ScaleUpdate::NoData;
        }
        let has_data = match self.bus.borrow_mut().get_bool(SCALE_ADDRESS, CMD_HAS_NEW_DATA) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "scale has-new-data query failed");
                return ScaleUpdate::CommunicationError;
            }
        };
        self.last_check_ms = now;
        if !has_data {
            if now > self.last_data_ms + self.cfg.data_timeout_ms {
                return ScaleUpdate::Timeout;
            }
            return ScaleUpdate::NoData;
        }
        match self.bus.borrow_mut().get_float(SCALE_ADDRESS, CMD_GET_DATA) {
            Ok(raw) if raw.is_finite() && raw.abs() < RAW_MAX => {
                self.raw = raw;
                self.last_data_ms = now;
                ScaleUpdate::DataRead
            }
            Ok(raw) => {
                tracing::debug!(raw, "scale returned implausible raw value");
                ScaleUpdate::CommunicationError
            }
            Err(e) => {
                tracing::debug!(error = %e, "scale data read failed");
                ScaleUpdate::CommunicationError
            }
        }
    }

    /// Last read weight in grams.
    pub fn weight(&self) -> f32 {
        (self.raw - self.cfg.offset) / self.cfg.calibration
    }

    pub fn set_calibration(&mut self, calibration: f32) {
        self.cfg.calibration = calibration;
    }

    pub fn set_offset(&mut self, offset: f32) {
        self.cfg.offset = offset;
    }

    /// Select the indicator animation shown on the scale's LED ring.
    pub fn set_indicator(&mut self, kind: u8) -> bool {
        super::send_retrying(
            &self.bus,
            SCALE_ADDRESS,
            CMD_SET_LED_TYPE,
            &[kind],
            SEND_RETRIES,
        )
    }
}
