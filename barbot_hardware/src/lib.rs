#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Hardware backends for the control core.
//!
//! Today this is the simulated machine (axis, bus, pumps sharing one
//! [`sim::SimWorld`]) plus the stdin/stdout command stream; the real ESP32
//! peripherals live behind the same `barbot_traits` traits on the device
//! build.

pub mod duplex;
pub mod error;
pub mod sim;

pub use duplex::ChannelDuplex;
pub use error::HwError;
pub use sim::{SimAxis, SimBus, SimPumps, SimWorld};
