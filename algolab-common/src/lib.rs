//! # algolab Common Library
//!
//! Shared code for the algolab workspace:
//! - Error type (`Error`, `Result`)
//! - TOML bootstrap configuration
//! - Database bootstrap (pool creation, settings table)
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
