//! Lizzy stack models.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use validator::Validate;

/// Suffixes of statuses after which a deployment no longer changes.
const TERMINAL_SUFFIXES: [&str; 2] = ["_FAILED", "_COMPLETE"];

/// Returns true if `status` marks the end of a deployment.
#[must_use]
pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_SUFFIXES
        .iter()
        .any(|suffix| status.ends_with(suffix))
}

/// A stack as returned by Lizzy.
///
/// Only `status` carries meaning for the client. Every other attribute is kept
/// verbatim in `extra`, whatever its JSON type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Stack {
    /// Deployment status, e.g. `CREATE_IN_PROGRESS` or `UPDATE_COMPLETE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// All other attributes returned by the server.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Stack {
    /// Deployment status, if the server reported one.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Raw attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }

    /// Stack identifier (`<name>-<version>`) when the server sent it as a string.
    #[must_use]
    pub fn stack_id(&self) -> Option<&str> {
        self.attribute("stack_id").and_then(Value::as_str)
    }

    /// Returns true once the deployment has completed or failed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(is_terminal_status)
    }
}

/// Caller-facing options for creating a stack.
///
/// The definition file contents are read by the client and added when the request
/// body is assembled.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct CreateStackOptions {
    /// Docker image version to deploy.
    #[validate(length(min = 1))]
    pub image_version: String,
    /// Explicit stack version; the server derives one when absent.
    pub stack_version: Option<String>,
    /// Keep a failed stack instead of rolling it back.
    pub disable_rollback: bool,
    /// Number of older stacks to keep.
    pub keep_stacks: u32,
    /// Traffic percentage routed to the new stack.
    #[validate(range(max = 100))]
    pub new_traffic: u8,
    /// Free-form definition parameters, passed through verbatim.
    pub parameters: Vec<String>,
}

impl CreateStackOptions {
    /// Options for deploying `image_version` with full traffic and no kept stacks.
    #[must_use]
    pub fn new(image_version: impl Into<String>) -> Self {
        Self {
            image_version: image_version.into(),
            stack_version: None,
            disable_rollback: false,
            keep_stacks: 0,
            new_traffic: 100,
            parameters: Vec::new(),
        }
    }

    /// Pin the stack version.
    #[must_use]
    pub fn with_stack_version(mut self, version: impl Into<String>) -> Self {
        self.stack_version = Some(version.into());
        self
    }

    /// Disable rollback on failure.
    #[must_use]
    pub const fn with_disable_rollback(mut self, disable: bool) -> Self {
        self.disable_rollback = disable;
        self
    }

    /// Number of older stacks to keep.
    #[must_use]
    pub const fn with_keep_stacks(mut self, keep: u32) -> Self {
        self.keep_stacks = keep;
        self
    }

    /// Traffic percentage for the new stack.
    #[must_use]
    pub const fn with_new_traffic(mut self, percentage: u8) -> Self {
        self.new_traffic = percentage;
        self
    }

    /// Append a definition parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameters.push(parameter.into());
        self
    }
}

/// Body of `POST /stacks`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CreateStackRequest<'a> {
    /// Docker image version to deploy.
    pub image_version: &'a str,
    /// Explicit stack version, omitted when unset or empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_version: Option<&'a str>,
    /// Keep a failed stack instead of rolling it back.
    pub disable_rollback: bool,
    /// Number of older stacks to keep.
    pub keep_stacks: u32,
    /// Traffic percentage routed to the new stack.
    pub new_traffic: u8,
    /// Free-form definition parameters.
    pub parameters: &'a [String],
    /// Raw contents of the definition file.
    pub senza_yaml: String,
}

impl<'a> CreateStackRequest<'a> {
    /// Assemble the request body from options and the definition file contents.
    #[must_use]
    pub fn new(options: &'a CreateStackOptions, senza_yaml: String) -> Self {
        Self {
            image_version: &options.image_version,
            stack_version: options
                .stack_version
                .as_deref()
                .filter(|version| !version.is_empty()),
            disable_rollback: options.disable_rollback,
            keep_stacks: options.keep_stacks,
            new_traffic: options.new_traffic,
            parameters: &options.parameters,
            senza_yaml,
        }
    }
}

/// Body of `PATCH /stacks/{id}`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Validate)]
pub struct TrafficUpdate {
    /// Traffic percentage routed to the stack.
    #[validate(range(max = 100))]
    pub new_traffic: u8,
}
