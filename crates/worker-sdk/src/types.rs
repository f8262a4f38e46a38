//! SDK error type.

use sb_bus::BusError;

#[derive(thiserror::Error, Debug)]
pub enum WorkerSdkError {
    #[error("config: {0}")]
    Config(String),
    #[error("bus: {0}")]
    Bus(#[from] BusError),
    #[error("bridge went away")]
    BridgeClosed,
    #[error("shutdown")]
    Shutdown,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
