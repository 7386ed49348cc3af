//! Shared types for the seckill workspace
//!
//! Common types used by the server crate and its HTTP clients: the unified
//! error system, persisted models and small time helpers.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use http;
pub use serde::{Deserialize, Serialize};
