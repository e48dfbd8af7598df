use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c error: {0}")]
    Bus(String),
    #[error("probe timeout")]
    Timeout,
    #[error("probe reply unparseable: {0}")]
    BadReply(String),
    #[error("unknown pump channel")]
    UnknownChannel,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
