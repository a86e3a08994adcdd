//! Shared helpers.

pub mod command;
pub mod filename;
pub mod fs;
