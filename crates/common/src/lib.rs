//! vflow Common Library
//!
//! Error taxonomy and shared value types for the vflow test-workflow engine.

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;

/// vflow version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
