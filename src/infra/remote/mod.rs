//! Remote data service adapters.

mod memory;
mod rest;

pub use memory::InMemoryDataService;
pub use rest::{RestDataService, RestOptions, diff_rows};
