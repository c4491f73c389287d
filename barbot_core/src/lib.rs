#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Supervisory control core of the drink machine (hardware-agnostic).
//!
//! All hardware interactions go through the `barbot_traits` traits: the
//! stepper axis, the pump bank and the satellite-board bus are injected, so
//! the whole orchestration layer runs unmodified against simulators.
//!
//! ## Architecture
//!
//! - **Status**: one closed enum, the single source of truth (`status` module)
//! - **Position**: micro-step bookkeeping and mm conversion (`position`)
//! - **Boards**: per-board proxies with bounded bus retries (`boards`)
//! - **Session**: per-dispense weight bookkeeping (`session`)
//! - **Machine**: the non-blocking state machine itself (`machine`)
//!
//! Every `update()` call performs one state's worth of bounded work and
//! returns; long-running operations are expressed as repeated polls.

pub mod boards;
pub mod config;
pub mod conversions;
pub mod error;
pub mod machine;
pub mod mocks;
pub mod position;
pub mod session;
pub mod status;

pub use config::{FeedbackWindow, MachineCfg, MotionCfg, RailGeometry};
pub use error::StartError;
pub use machine::StateMachine;
pub use position::StepConverter;
pub use session::DraftSession;
pub use status::Status;
