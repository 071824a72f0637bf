//! # Ingest Common Library
//!
//! Shared code for the ingest services:
//! - Error and result types
//! - Configuration loading and root folder resolution
//! - SQLite pool initialization
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
