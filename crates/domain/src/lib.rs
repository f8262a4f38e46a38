//! Shared configuration and error types for the SignalBench crates.

pub mod config;
pub mod error;

pub use error::{Error, Result};
