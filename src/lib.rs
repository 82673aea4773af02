//! # `strandyard`
//!
//! A file-backed task store that keeps parent, blocker, and free-list
//! relationships consistent.

pub mod activity;
pub mod config;
pub mod error;
pub mod paths;
pub mod roles;
pub mod storage;
pub mod tasks;
pub mod testing;
pub mod traits;

pub use error::{Error, Result};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
