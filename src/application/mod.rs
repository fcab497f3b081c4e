//! Application services: resolution, synchronization, monitoring and the
//! collaborator seams they depend on.

pub mod document;
pub mod gateway;
pub mod local;
pub mod monitor;
pub mod resolver;
pub mod settings;
pub mod subscribers;
mod tasks;
