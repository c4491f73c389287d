//! Proxy for the straw-dispenser board.

use std::cell::RefCell;
use std::rc::Rc;

use barbot_traits::Bus;

use super::STRAW_ADDRESS;

const CMD_DISPENSE: u8 = 1;
const CMD_GET_IS_DISPENSING: u8 = 2;
const CMD_GET_SUCCESSFUL: u8 = 3;

const SEND_RETRIES: u32 = 5;

pub struct StrawBoard<B: Bus> {
    bus: Rc<RefCell<B>>,
}

impl<B: Bus> StrawBoard<B> {
    pub fn new(bus: Rc<RefCell<B>>) -> Self {
        Self { bus }
    }

    /// Kick off one dispense cycle. True if transmitted.
    pub fn start_dispense(&mut self) -> bool {
        super::send_retrying(&self.bus, STRAW_ADDRESS, CMD_DISPENSE, &[], SEND_RETRIES)
    }

    /// Whether the dispenser is still cycling. `None` = transmission failed.
    pub fn is_dispensing(&mut self) -> Option<bool> {
        super::get_bool_retrying(&self.bus, STRAW_ADDRESS, CMD_GET_IS_DISPENSING, SEND_RETRIES)
    }

    /// Whether the last cycle failed to deliver a straw (magazine empty).
    /// `None` = transmission failed.
    pub fn is_error(&mut self) -> Option<bool> {
        super::get_bool_retrying(&self.bus, STRAW_ADDRESS, CMD_GET_SUCCESSFUL, SEND_RETRIES)
            .map(|ok| !ok)
    }
}
