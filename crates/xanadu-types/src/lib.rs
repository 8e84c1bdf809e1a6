//! Foundation types for the xanadu shell.
//!
//! Shared by every xanadu crate: the error enum, the TOML-backed shell
//! configuration, and the user-visible log level.

pub mod config;
pub mod error;
pub mod level;
