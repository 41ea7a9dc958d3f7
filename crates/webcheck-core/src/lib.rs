//! Core types, run configuration, and errors for webcheck.

pub mod config;
pub mod devices;
pub mod error;
pub mod types;
