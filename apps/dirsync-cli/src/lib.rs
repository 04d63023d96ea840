//! dirsync CLI library
//!
//! Exposes the command implementations so they can be driven from
//! integration tests with an in-memory directory.

pub mod commands;
pub mod config;
pub mod error;
pub mod formats;
pub mod logging;
pub mod output;
