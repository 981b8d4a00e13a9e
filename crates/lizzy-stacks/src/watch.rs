//! Deployment polling.
//!
//! A [`DeploymentWatch`] repeatedly fetches a stack and reports its status until the
//! status is terminal (`*_COMPLETE` or `*_FAILED`) or too many fetches in a row have
//! failed. Updates are pulled one at a time with [`DeploymentWatch::next`], or pushed
//! through a channel by a background task with [`DeploymentWatch::spawn`].

use crate::models::{is_terminal_status, Stack};
use crate::Result;
use async_trait::async_trait;
use lizzy_core::client::PollPolicy;
use lizzy_core::Error;
use std::fmt;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Buffered updates between a spawned watch and its receiver.
const CHANNEL_CAPACITY: usize = 8;

/// Anything that can fetch the current state of a stack.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StackSource: Send + Sync {
    /// Fetch a stack by identifier.
    async fn fetch_stack(&self, stack_id: &str) -> Result<Stack>;
}

/// One element of a deployment watch.
#[derive(Debug, Clone, PartialEq)]
pub enum DeploymentUpdate {
    /// The stack reported this status.
    Status(String),
    /// Fetching the stack failed.
    Failure {
        /// Failures still tolerated before the watch gives up.
        retries_left: u32,
        /// Why the fetch failed.
        error: Error,
    },
}

impl DeploymentUpdate {
    /// The reported status, if this update carries one.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        match self {
            Self::Status(status) => Some(status.as_str()),
            Self::Failure { .. } => None,
        }
    }

    /// Returns true if the stack reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status().is_some_and(is_terminal_status)
    }
}

impl fmt::Display for DeploymentUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => f.write_str(status),
            Self::Failure {
                retries_left,
                error,
            } => write!(
                f,
                "Failed to get stack ({retries_left} retries left): {error}."
            ),
        }
    }
}

/// Where a watch currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// The last fetch succeeded (or nothing was fetched yet).
    Polling,
    /// The last fetch failed but retries remain.
    Retrying,
    /// A terminal status was seen or the retries ran out.
    Done,
}

/// Lazy, finite sequence of status updates for one stack.
#[derive(Debug)]
pub struct DeploymentWatch<S> {
    source: S,
    stack_id: String,
    policy: PollPolicy,
    retries_left: u32,
    state: WatchState,
    fetched: bool,
    last_error: Option<Error>,
}

impl<S: StackSource> DeploymentWatch<S> {
    /// Watch `stack_id` through `source`.
    #[must_use]
    pub fn new(source: S, stack_id: impl Into<String>, policy: PollPolicy) -> Self {
        Self {
            source,
            stack_id: stack_id.into(),
            policy,
            retries_left: policy.max_consecutive_failures,
            state: WatchState::Polling,
            fetched: false,
            last_error: None,
        }
    }

    /// Identifier of the watched stack.
    #[must_use]
    pub fn stack_id(&self) -> &str {
        &self.stack_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> WatchState {
        self.state
    }

    /// Consecutive failures still tolerated.
    #[must_use]
    pub const fn retries_left(&self) -> u32 {
        self.retries_left
    }

    /// Most recent fetch error, kept even after a later success.
    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    /// Fetch the next update, pausing for the poll interval first unless this is the
    /// first fetch. Returns `None` once the watch is done.
    pub async fn next(&mut self) -> Option<DeploymentUpdate> {
        if self.state == WatchState::Done || self.retries_left == 0 {
            self.state = WatchState::Done;
            return None;
        }

        if self.fetched {
            sleep(self.policy.interval).await;
        }
        self.fetched = true;

        let fetched = self
            .source
            .fetch_stack(&self.stack_id)
            .await
            .and_then(|stack| {
                stack
                    .status
                    .ok_or_else(|| Error::MissingStatus(self.stack_id.clone()))
            });

        match fetched {
            Ok(status) => {
                self.retries_left = self.policy.max_consecutive_failures;
                self.state = if is_terminal_status(&status) {
                    WatchState::Done
                } else {
                    WatchState::Polling
                };
                debug!(stack_id = %self.stack_id, %status, "Stack status");
                Some(DeploymentUpdate::Status(status))
            }
            Err(error) => {
                self.retries_left -= 1;
                self.state = if self.retries_left == 0 {
                    WatchState::Done
                } else {
                    WatchState::Retrying
                };
                warn!(
                    stack_id = %self.stack_id,
                    retries_left = self.retries_left,
                    %error,
                    "Failed to get stack"
                );
                self.last_error = Some(error.clone());
                Some(DeploymentUpdate::Failure {
                    retries_left: self.retries_left,
                    error,
                })
            }
        }
    }

    /// Drain the watch into a vector.
    pub async fn collect(mut self) -> Vec<DeploymentUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = self.next().await {
            updates.push(update);
        }
        updates
    }

    /// Drain the watch and return the terminal status.
    ///
    /// # Errors
    ///
    /// Returns the last fetch error when the watch gave up before a terminal status.
    pub async fn finish(mut self) -> Result<String> {
        let mut last_status = None;
        while let Some(update) = self.next().await {
            if let DeploymentUpdate::Status(status) = update {
                last_status = Some(status);
            }
        }

        match last_status {
            Some(status) if is_terminal_status(&status) => Ok(status),
            _ => Err(self.last_error.take().unwrap_or_else(|| {
                Error::ServiceUnavailable(format!(
                    "Gave up waiting for stack `{}`",
                    self.stack_id
                ))
            })),
        }
    }
}

impl<S: StackSource + 'static> DeploymentWatch<S> {
    /// Run the watch on a background task and receive updates through a channel.
    ///
    /// Dropping the receiver stops the task at its next update. Must be called from
    /// within a Tokio runtime.
    #[must_use]
    pub fn spawn(mut self) -> mpsc::Receiver<DeploymentUpdate> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            while let Some(update) = self.next().await {
                if tx.send(update).await.is_err() {
                    debug!(stack_id = %self.stack_id, "Deployment watch receiver dropped");
                    break;
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    fn stack(status: &str) -> Stack {
        Stack {
            status: Some(status.to_string()),
            ..Stack::default()
        }
    }

    fn refused() -> Error {
        Error::ServiceUnavailable("connection refused".to_string())
    }

    /// Source that replays `outcomes` in order.
    fn scripted(outcomes: Vec<Result<Stack>>) -> MockStackSource {
        let count = outcomes.len();
        let mut outcomes = VecDeque::from(outcomes);
        let mut source = MockStackSource::new();
        source
            .expect_fetch_stack()
            .with(eq("app-42"))
            .times(count)
            .returning(move |_| outcomes.pop_front().unwrap());
        source
    }

    fn rendered(updates: &[DeploymentUpdate]) -> Vec<String> {
        updates.iter().map(ToString::to_string).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_terminal_status() {
        let source = scripted(vec![
            Ok(stack("RUNNING")),
            Ok(stack("RUNNING")),
            Ok(stack("UPDATE_COMPLETE")),
        ]);

        let started = Instant::now();
        let updates = DeploymentWatch::new(source, "app-42", PollPolicy::new())
            .collect()
            .await;

        assert_eq!(
            rendered(&updates),
            ["RUNNING", "RUNNING", "UPDATE_COMPLETE"]
        );
        assert!(updates[2].is_terminal());

        // One interval between consecutive fetches, none after the last.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(20));
        assert!(elapsed < Duration::from_secs(21));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_consecutive_failures() {
        let source = scripted(vec![Err(refused()), Err(refused()), Err(refused())]);
        let mut watch = DeploymentWatch::new(source, "app-42", PollPolicy::new());

        let mut updates = Vec::new();
        while let Some(update) = watch.next().await {
            updates.push(update);
        }

        assert_eq!(
            rendered(&updates),
            [
                "Failed to get stack (2 retries left): Service unavailable: connection refused.",
                "Failed to get stack (1 retries left): Service unavailable: connection refused.",
                "Failed to get stack (0 retries left): Service unavailable: connection refused.",
            ]
        );
        assert_eq!(watch.state(), WatchState::Done);
        assert_eq!(watch.retries_left(), 0);
        assert_eq!(watch.last_error(), Some(&refused()));
        assert!(watch.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_retry_budget() {
        let source = scripted(vec![
            Err(refused()),
            Err(refused()),
            Ok(stack("CREATE_IN_PROGRESS")),
            Err(refused()),
            Err(refused()),
            Ok(stack("CREATE_FAILED")),
        ]);
        let mut watch = DeploymentWatch::new(source, "app-42", PollPolicy::new());

        let mut retries = Vec::new();
        let mut statuses = Vec::new();
        while let Some(update) = watch.next().await {
            match update {
                DeploymentUpdate::Status(status) => {
                    assert_eq!(watch.retries_left(), 3);
                    statuses.push(status);
                }
                DeploymentUpdate::Failure { retries_left, .. } => {
                    assert_eq!(watch.state(), WatchState::Retrying);
                    retries.push(retries_left);
                }
            }
        }

        assert_eq!(retries, [2, 1, 2, 1]);
        assert_eq!(statuses, ["CREATE_IN_PROGRESS", "CREATE_FAILED"]);
        assert_eq!(watch.state(), WatchState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_status_counts_as_failure() {
        let source = scripted(vec![Ok(Stack::default()), Ok(stack("DELETE_COMPLETE"))]);
        let updates = DeploymentWatch::new(source, "app-42", PollPolicy::new())
            .collect()
            .await;

        assert_eq!(
            updates[0],
            DeploymentUpdate::Failure {
                retries_left: 2,
                error: Error::MissingStatus("app-42".to_string()),
            }
        );
        assert_eq!(updates[1].status(), Some("DELETE_COMPLETE"));
    }

    #[tokio::test]
    async fn zero_failure_budget_yields_nothing() {
        let mut source = MockStackSource::new();
        source.expect_fetch_stack().never();

        let policy = PollPolicy::new().with_max_consecutive_failures(0);
        let mut watch = DeploymentWatch::new(source, "app-42", policy);
        assert!(watch.next().await.is_none());
        assert_eq!(watch.state(), WatchState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_returns_terminal_status() {
        let source = scripted(vec![Err(refused()), Ok(stack("UPDATE_COMPLETE"))]);
        let status = DeploymentWatch::new(source, "app-42", PollPolicy::new())
            .finish()
            .await
            .unwrap();
        assert_eq!(status, "UPDATE_COMPLETE");
    }

    #[tokio::test(start_paused = true)]
    async fn finish_returns_last_error_when_exhausted() {
        let timeout = Error::Timeout("deadline elapsed".to_string());
        let source = scripted(vec![Err(refused()), Err(refused()), Err(timeout.clone())]);
        let err = DeploymentWatch::new(source, "app-42", PollPolicy::new())
            .finish()
            .await
            .unwrap_err();
        assert_eq!(err, timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_watch_streams_updates() {
        let source = scripted(vec![
            Ok(stack("CREATE_IN_PROGRESS")),
            Err(refused()),
            Ok(stack("CREATE_COMPLETE")),
        ]);

        let mut rx = DeploymentWatch::new(source, "app-42", PollPolicy::new()).spawn();
        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }

        assert_eq!(
            rendered(&updates),
            [
                "CREATE_IN_PROGRESS",
                "Failed to get stack (2 retries left): Service unavailable: connection refused.",
                "CREATE_COMPLETE",
            ]
        );
    }

    #[test]
    fn update_display() {
        let update = DeploymentUpdate::Failure {
            retries_left: 1,
            error: Error::Timeout("read".to_string()),
        };
        assert_eq!(
            update.to_string(),
            "Failed to get stack (1 retries left): Timeout waiting for Lizzy: read."
        );
        assert!(!update.is_terminal());
        assert_eq!(update.status(), None);
    }
}
