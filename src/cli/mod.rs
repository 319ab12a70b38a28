//! CLI module for kmcqa
//!
//! Handles command-line argument parsing and verbosity.

pub mod args;

pub use args::{Args, Commands, FormatMode, Verbosity};
