//! Foundation types for hackshell.
//!
//! This crate holds what every other hackshell crate shares: the error
//! taxonomy used across the virtual filesystem and the interpreter, and the
//! TOML-backed runtime configuration.

pub mod config;
pub mod error;
