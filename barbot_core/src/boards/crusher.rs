//! Proxy for the ice-crusher board.

use std::cell::RefCell;
use std::rc::Rc;

use barbot_traits::Bus;

use super::CRUSHER_ADDRESS;

const CMD_START_CRUSHING: u8 = 1;
const CMD_STOP_CRUSHING: u8 = 2;
const CMD_GET_ERROR: u8 = 3;

const SEND_RETRIES: u32 = 15;

/// Fault codes reported by the crusher firmware.
pub const CRUSHER_ERROR_NONE: u8 = 0;
pub const CRUSHER_ERROR_COVER_OPEN: u8 = 1;
pub const CRUSHER_ERROR_TIMEOUT: u8 = 2;

pub struct CrusherBoard<B: Bus> {
    bus: Rc<RefCell<B>>,
}

impl<B: Bus> CrusherBoard<B> {
    pub fn new(bus: Rc<RefCell<B>>) -> Self {
        Self { bus }
    }

    pub fn start(&mut self) -> bool {
        super::send_retrying(&self.bus, CRUSHER_ADDRESS, CMD_START_CRUSHING, &[], SEND_RETRIES)
    }

    pub fn stop(&mut self) -> bool {
        super::send_retrying(&self.bus, CRUSHER_ADDRESS, CMD_STOP_CRUSHING, &[], SEND_RETRIES)
    }

    /// Current fault code. `None` = transmission failed. On a fault the
    /// crusher halts on its own; no stop command is required.
    pub fn error_code(&mut self) -> Option<u8> {
        self.bus
            .borrow_mut()
            .get_byte(CRUSHER_ADDRESS, CMD_GET_ERROR)
            .ok()
    }
}
