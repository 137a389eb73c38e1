//! Bounded-retry downloads.

use std::time::Duration;

use arbor_core::config::FetchConfig;
use arbor_core::{DownloadRef, FileDescriptor, RawPayload};
use tracing::{debug, warn};

use crate::client::RemoteTree;
use crate::error::DriveError;
use crate::store::ContentStore;

/// How often and how patiently a download is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: config.retry_delay(),
        }
    }
}

impl RetryPolicy {
    /// Wait before the next attempt. A server-provided `Retry-After` wins when
    /// it is longer than the fixed delay.
    fn pause_for(&self, error: &DriveError) -> Duration {
        match error {
            DriveError::RateLimited {
                retry_after_secs: Some(secs),
            } => self.delay.max(Duration::from_secs(*secs)),
            _ => self.delay,
        }
    }
}

/// Downloads bytes through a [`RemoteTree`], retrying transient failures and
/// optionally keeping a copy in a local [`ContentStore`].
pub struct RetryingFetcher<'a> {
    tree: &'a dyn RemoteTree,
    policy: RetryPolicy,
    store: Option<ContentStore>,
}

impl<'a> RetryingFetcher<'a> {
    pub fn new(tree: &'a dyn RemoteTree, policy: RetryPolicy) -> Self {
        Self {
            tree,
            policy,
            store: None,
        }
    }

    pub fn with_store(mut self, store: ContentStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Download `reference`, retrying only errors that may go away.
    ///
    /// Non-retryable errors are returned at once; retryable ones end in
    /// [`DriveError::Exhausted`] after `max_attempts`.
    pub async fn fetch(&self, reference: &DownloadRef) -> Result<Vec<u8>, DriveError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.tree.download(reference).await {
                Ok(bytes) => {
                    debug!(reference = %reference, attempt, bytes = bytes.len(), "downloaded");
                    return Ok(bytes);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    warn!(reference = %reference, attempts = attempt, error = %e, "download failed");
                    return Err(DriveError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    let pause = self.policy.pause_for(&e);
                    warn!(
                        reference = %reference,
                        attempt,
                        max_attempts,
                        error = %e,
                        "download attempt failed, retrying in {:?}",
                        pause
                    );
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    /// Fetch a crawled file and persist it when a store is configured.
    ///
    /// Store failures are logged and do not fail the fetch.
    pub async fn fetch_file(&self, descriptor: &FileDescriptor) -> Result<RawPayload, DriveError> {
        let bytes = self.fetch(&descriptor.download_ref()).await?;
        if let Some(store) = &self.store {
            if let Err(e) = store.save(descriptor, &bytes).await {
                warn!(path = %descriptor.display_path(), error = %e, "could not persist download");
            }
        }
        Ok(RawPayload {
            descriptor: descriptor.clone(),
            bytes,
        })
    }
}
