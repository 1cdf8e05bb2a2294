//! Memory Bank State Management
//!
//! Storage backends, envelope handling, validation and the persistence
//! manager that ties them together. The whole dataset is stored as a single
//! versioned document under one key.

pub mod codec;
pub mod envelope;
pub mod validator;
pub mod memory;
pub mod key_value;
pub mod structured;
pub mod documents;
pub mod manager;
pub mod notifier;

pub use memory::*;
pub use key_value::*;
pub use structured::*;
pub use manager::*;
pub use notifier::*;
