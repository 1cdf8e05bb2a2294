//! Memory Bank CLI Library

pub mod commands;
pub mod sample;

pub use commands::*;
pub use sample::*;
