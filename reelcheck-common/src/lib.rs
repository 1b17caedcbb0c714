//! # reelcheck Common Library
//!
//! Shared code for the reelcheck crates:
//! - Error type used across crates
//! - Configuration file resolution and TOML loading
//! - Logging initialisation

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
