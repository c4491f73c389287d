//! Proxy for the sugar-dispenser board.

use std::cell::RefCell;
use std::rc::Rc;

use barbot_traits::Bus;

use super::SUGAR_ADDRESS;

const CMD_START_DISPENSING: u8 = 1;
const CMD_STOP_DISPENSING: u8 = 2;
const CMD_GET_ERROR: u8 = 3;

const SEND_RETRIES: u32 = 15;

pub const SUGAR_ERROR_NONE: u8 = 0;
pub const SUGAR_ERROR_TIMEOUT: u8 = 1;

pub struct SugarBoard<B: Bus> {
    bus: Rc<RefCell<B>>,
}

impl<B: Bus> SugarBoard<B> {
    pub fn new(bus: Rc<RefCell<B>>) -> Self {
        Self { bus }
    }

    pub fn start(&mut self) -> bool {
        super::send_retrying(&self.bus, SUGAR_ADDRESS, CMD_START_DISPENSING, &[], SEND_RETRIES)
    }

    pub fn stop(&mut self) -> bool {
        super::send_retrying(&self.bus, SUGAR_ADDRESS, CMD_STOP_DISPENSING, &[], SEND_RETRIES)
    }

    /// Current fault code. `None` = transmission failed.
    pub fn error_code(&mut self) -> Option<u8> {
        self.bus
            .borrow_mut()
            .get_byte(SUGAR_ADDRESS, CMD_GET_ERROR)
            .ok()
    }
}
