//! Command implementations for CLI tools.
//!
//! Each module holds the full implementation of a command, invoked by a
//! thin wrapper binary.

pub mod check;
