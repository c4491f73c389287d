use thiserror::Error;

use crate::status::Status;

/// Why an action-start call was refused. No state changes on refusal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    #[error("machine is busy ({0:?})")]
    Busy(Status),
    #[error("pump port {0} out of range")]
    PortOutOfRange(u8),
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}
