//! Proxy for the mixer board: head positioning plus the mixing cycle.

use std::cell::RefCell;
use std::rc::Rc;

use barbot_traits::Bus;

use super::MIXER_ADDRESS;

const CMD_START_MIXING: u8 = 1;
const CMD_GET_IS_MIXING: u8 = 2;
const CMD_GET_SUCCESSFUL: u8 = 3;
const CMD_SET_TARGET_POS: u8 = 4;
const CMD_GET_POS: u8 = 5;

const SEND_RETRIES: u32 = 5;

const POS_TOP: u8 = 0;
const POS_BOTTOM: u8 = 1;

/// Mechanical end positions of the mixer head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerPosition {
    Top,
    Bottom,
}

impl MixerPosition {
    fn wire(self) -> u8 {
        match self {
            MixerPosition::Top => POS_TOP,
            MixerPosition::Bottom => POS_BOTTOM,
        }
    }
}

pub struct MixerBoard<B: Bus> {
    bus: Rc<RefCell<B>>,
}

impl<B: Bus> MixerBoard<B> {
    pub fn new(bus: Rc<RefCell<B>>) -> Self {
        Self { bus }
    }

    /// Command the head toward an end position. True if transmitted.
    pub fn start_moving(&mut self, pos: MixerPosition) -> bool {
        super::send_retrying(
            &self.bus,
            MIXER_ADDRESS,
            CMD_SET_TARGET_POS,
            &[pos.wire()],
            SEND_RETRIES,
        )
    }

    /// Whether the head currently rests at `pos`; false on transmission
    /// failure, since an unknown position must never satisfy a wait.
    pub fn is_at(&mut self, pos: MixerPosition) -> bool {
        let mut bus = self.bus.borrow_mut();
        for _ in 0..SEND_RETRIES {
            if let Ok(current) = bus.get_byte(MIXER_ADDRESS, CMD_GET_POS) {
                return current == pos.wire();
            }
        }
        false
    }

    /// Start a mixing cycle of the given duration. True if transmitted.
    pub fn start_mixing(&mut self, seconds: u8) -> bool {
        super::send_retrying(
            &self.bus,
            MIXER_ADDRESS,
            CMD_START_MIXING,
            &[seconds],
            SEND_RETRIES,
        )
    }

    /// Whether a mixing cycle is still running. `None` = transmission failed.
    pub fn is_mixing(&mut self) -> Option<bool> {
        super::get_bool_retrying(&self.bus, MIXER_ADDRESS, CMD_GET_IS_MIXING, SEND_RETRIES)
    }

    /// Whether the last finished cycle succeeded. `None` = transmission failed.
    pub fn was_successful(&mut self) -> Option<bool> {
        super::get_bool_retrying(&self.bus, MIXER_ADDRESS, CMD_GET_SUCCESSFUL, SEND_RETRIES)
    }
}
