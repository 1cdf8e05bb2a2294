//! Memory Bank Core Library
//!
//! Core types, traits, and configuration for the local persistence layer of
//! the e-commerce admin dashboard.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
