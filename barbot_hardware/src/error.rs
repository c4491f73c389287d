use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("command stream closed")]
    StreamClosed,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
