//! Infrastructure adapters and runtime bootstrap.

pub mod document;
pub mod error;
pub mod notifier;
pub mod remote;
pub mod storage;
pub mod telemetry;
