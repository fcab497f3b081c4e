//! Resolution cache.
//!
//! An in-memory, per-key, time-boxed cache that sits in front of the remote
//! gateway so repeated reads within one TTL do not hit the network.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! ttl_seconds = 300
//! capacity = 128
//! write_through = true
//! ```

pub mod clock;
mod config;
mod keys;
pub(crate) mod lock;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use keys::CacheKey;
pub use store::{CacheEntry, ResolutionCache};
