// Error types for link-layer operations

use alloc::string::String;
use thiserror::Error;

/// Link-layer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("packet driver not initialised")]
    NotInitialized,

    #[error("no packet driver found")]
    NoDriver,

    #[error("driver already released")]
    Released,

    #[error("operation not supported on this medium")]
    UnsupportedMedium,

    #[error("receive queue full")]
    QueueFull,

    #[error("transmit failed")]
    TransmitFailed,

    #[error("frame rejected")]
    FrameRejected,

    #[error("address change rejected for this medium")]
    AddressRejected,

    #[error("backend error: {0}")]
    Backend(String),
}
