//! Domain layer types and invariants.

pub mod change;
pub mod content;
pub mod defaults;
pub mod error;
pub mod rows;
pub mod settings;
pub mod types;
