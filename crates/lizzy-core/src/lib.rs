//! # lizzy-core
//!
//! Core types and utilities for talking to the Lizzy deployment orchestration API.
//!
//! This crate provides the shared error type, client configuration, HTTP tuning and
//! the server version advisory used by the stack client.
//!
//! ## Modules
//!
//! - [`error`] - Error type and HTTP status classification
//! - [`config`] - Configuration for a Lizzy client instance
//! - [`client`] - HTTP client tuning and the deployment poll policy
//! - [`version`] - `X-Lizzy-Version` advisory check
//! - [`query`] - Query parameter builder

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod query;
pub mod version;

// Re-export commonly used types
pub use error::{Error, Result};
