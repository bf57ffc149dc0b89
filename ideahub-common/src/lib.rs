//! # IdeaHub Common Library
//!
//! Shared code for IdeaHub services:
//! - Common error type
//! - Bootstrap configuration loading (TOML + environment)
//! - Data folder resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
