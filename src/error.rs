use crate::domain::request::IntegrationStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum HubError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Integration request {0} not found")]
    NotFound(Uuid),
    #[error("Gateway failure: {0}")]
    GatewayFailure(String),
    #[error("Failed to send data to external system '{target_system}'")]
    DeliveryRejected { target_system: String },
    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition {
        from: IntegrationStatus,
        to: IntegrationStatus,
    },
    #[error("Channel '{channel}' is full (capacity {capacity})")]
    ChannelFull { channel: String, capacity: usize },
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),
}

impl HubError {
    /// Failures raised by a gateway call, as opposed to caller mistakes.
    pub fn is_gateway_failure(&self) -> bool {
        matches!(self, HubError::GatewayFailure(_) | HubError::Io(_))
            || self.is_storage_failure()
    }

    #[cfg(feature = "storage-rocksdb")]
    fn is_storage_failure(&self) -> bool {
        matches!(self, HubError::Storage(_))
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    fn is_storage_failure(&self) -> bool {
        false
    }
}

pub type Result<T> = std::result::Result<T, HubError>;
