//! HTTP request handlers organized by surface
//!
//! Each submodule contains handlers for a specific API area.

pub mod admin;
pub mod health;
pub mod webhook;

// Re-export all handlers for use in router
pub use admin::*;
pub use health::*;
pub use webhook::*;
