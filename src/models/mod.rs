//! Data Models
//!
//! Configuration structures persisted to disk.

pub mod settings;

pub use settings::*;
