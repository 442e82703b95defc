//! Core types, config, errors, and wire protocol for Drawbridge.

pub mod config;
pub mod error;
pub mod protocol;
pub mod session_store;
pub mod types;

pub use error::{DrawbridgeError, Result};
pub use types::{DrawableElement, ElementType};
