//! HTTP API handlers for algolab-eval
//!
//! The classification proxy lets clients run a registered classifier on
//! the server, where the language-model credential lives.

pub mod classifiers;
pub mod health;

pub use classifiers::classifier_routes;
pub use health::health_routes;
