//! Action completion watcher.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{JobError, Result};

use super::api::{CloudApi, JobHandle, JobWatcher};
use super::types::ActionStatus;

/// Default interval between action status polls in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Resolves jobs by polling `/actions/{id}` until the action leaves
/// `running`.
///
/// There is no overall timeout: a job that never finishes keeps the caller
/// suspended.
#[derive(Debug, Clone)]
pub struct ActionWatcher<A> {
    api: A,
    poll_interval: Duration,
}

impl<A: CloudApi> ActionWatcher<A> {
    /// Creates a watcher with the default poll interval.
    #[must_use]
    pub const fn new(api: A) -> Self {
        Self {
            api,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl<A: CloudApi> JobWatcher for ActionWatcher<A> {
    async fn wait(&self, job: JobHandle) -> Result<()> {
        loop {
            let action = self.api.get_action(job.id()).await?;

            match action.status {
                ActionStatus::Success => {
                    debug!("{job} finished");
                    return Ok(());
                }
                ActionStatus::Error => {
                    let (code, message) = action
                        .error
                        .map(|e| (e.code, e.message))
                        .unwrap_or_default();
                    warn!("{job} failed: {code}: {message}");
                    return Err(JobError {
                        action_id: job.id(),
                        command: job.command().to_string(),
                        code,
                        message,
                    }
                    .into());
                }
                ActionStatus::Running => {
                    debug!("{job} at {}%", action.progress);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}
