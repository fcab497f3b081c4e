//! Content resolution and live-sync engine for a portfolio site.
//!
//! Page content and site settings are resolved through an in-memory TTL cache,
//! a remote data service, a durable local snapshot and compiled defaults, in
//! that order. Remote change feeds keep the published snapshots fresh and fan
//! them out to subscribers.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
