use thiserror::Error;

use crate::application::gateway::GatewayError;
use crate::application::local::StoreError;
use crate::application::monitor::{MonitorError, NotifierError};
use crate::application::resolver::ResolverError;
use crate::application::settings::SyncError;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {message}")]
    Configuration { message: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Notifier(#[from] NotifierError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

impl InfraError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
