//! Core domain models for deployments
//!
//! This module defines the configuration, triggers, pipeline state and
//! error types shared by every other part of the crate.

pub mod config;
pub mod error;
pub mod state;
pub mod trigger;

pub use config::*;
pub use error::*;
pub use state::*;
pub use trigger::*;
