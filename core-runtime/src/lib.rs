//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the Haki client core:
//! - Logging and tracing infrastructure
//! - Client configuration and bridge wiring
//! - Event bus for session lifecycle notifications
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the auth and service crates
//! depend on. It establishes the logging conventions, the configuration
//! contract, and the event broadcasting mechanism used throughout the client.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};
