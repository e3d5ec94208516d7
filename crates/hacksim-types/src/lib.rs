//! Foundation types for hacksim.
//!
//! Shared by every hacksim crate: the error taxonomy, engine configuration,
//! and wall-clock timestamps.

pub mod config;
pub mod error;
pub mod time;
