//! # GeoKYC Common Library
//!
//! Shared code for the GeoKYC crates:
//! - Common error type
//! - Configuration file resolution and TOML loading
//! - Logging bootstrap

pub mod config;
pub mod error;

pub use error::{Error, Result};
