//! # menugen Common Library
//!
//! Shared code for the menugen services:
//! - Error types
//! - Configuration loading (TOML + environment) and root folder resolution
//! - Pipeline event types and the broadcast `EventBus`

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
