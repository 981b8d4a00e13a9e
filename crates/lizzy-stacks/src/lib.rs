//! Stack client for the Lizzy deployment orchestration API.
//!
//! Provides typed models, an asynchronous [`StackClient`] for the `stacks` collection
//! and a [`DeploymentWatch`] that polls a stack until its deployment settles.

#![deny(missing_docs)]

pub mod client;
pub mod models;
pub mod watch;

pub use client::{StackClient, StackClientBuilder};
pub use models::{CreateStackOptions, CreateStackRequest, Stack, TrafficUpdate};
pub use watch::{DeploymentUpdate, DeploymentWatch, StackSource, WatchState};

/// Convenient result alias that reuses the shared Lizzy error type.
pub type Result<T> = lizzy_core::Result<T>;
