//! Utility modules for algolab-eval

pub mod db_retry;

pub use db_retry::{retry_on_lock, LockRetry};
