//! vflow CLI
//!
//! Command-line interface for listing and running vflow workflows.

pub mod commands;
pub mod output;
