//! Satellite board proxies: thin request/response wrappers over the shared
//! [`Bus`](barbot_traits::Bus), one per auxiliary board, each with its own
//! bounded retry budget. Transient transmission failures are retried here;
//! everything the proxies return is already the final verdict for the
//! orchestration layer.

mod crusher;
mod mixer;
mod scale;
mod straw;
mod sugar;

pub use crusher::{
    CRUSHER_ERROR_COVER_OPEN, CRUSHER_ERROR_NONE, CRUSHER_ERROR_TIMEOUT, CrusherBoard,
};
pub use mixer::{MixerBoard, MixerPosition};
pub use scale::{ScaleBoard, ScaleCfg, ScaleUpdate};
pub use straw::StrawBoard;
pub use sugar::{SUGAR_ERROR_NONE, SUGAR_ERROR_TIMEOUT, SugarBoard};

use std::cell::RefCell;
use std::rc::Rc;

use barbot_traits::Bus;

pub const SCALE_ADDRESS: u8 = 0x01;
pub const MIXER_ADDRESS: u8 = 0x02;
pub const STRAW_ADDRESS: u8 = 0x03;
pub const CRUSHER_ADDRESS: u8 = 0x04;
pub const SUGAR_ADDRESS: u8 = 0x05;

/// Highest address probed by the liveness scan.
pub const MAX_BOARDS: u8 = 8;

/// Probe every possible board address; bit n is set when address n replied.
pub fn ping_all<B: Bus>(bus: &Rc<RefCell<B>>) -> u16 {
    let mut mask = 0u16;
    let mut bus = bus.borrow_mut();
    for address in 0..MAX_BOARDS {
        if bus.ping(address) {
            mask |= 1 << address;
        }
    }
    mask
}

/// Send `command` with no payload, retrying up to `retries` times.
pub(crate) fn send_retrying<B: Bus>(
    bus: &Rc<RefCell<B>>,
    address: u8,
    command: u8,
    data: &[u8],
    retries: u32,
) -> bool {
    let mut bus = bus.borrow_mut();
    for attempt in 0..retries {
        match bus.send(address, command, data) {
            Ok(()) => return true,
            Err(e) => {
                tracing::debug!(address, command, attempt, error = %e, "bus send failed");
            }
        }
    }
    false
}

/// Query a boolean, retrying up to `retries` times. `None` after exhaustion.
pub(crate) fn get_bool_retrying<B: Bus>(
    bus: &Rc<RefCell<B>>,
    address: u8,
    command: u8,
    retries: u32,
) -> Option<bool> {
    let mut bus = bus.borrow_mut();
    for attempt in 0..retries {
        match bus.get_bool(address, command) {
            Ok(v) => return Some(v),
            Err(e) => {
                tracing::debug!(address, command, attempt, error = %e, "bus query failed");
            }
        }
    }
    None
}
