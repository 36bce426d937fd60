//! Channel post to discussion root mapping
//!
//! Telegram copies every channel post into the linked discussion group as an
//! automatic forward. Comments on the post are replies to that copy, so the
//! copy's id is the thread root. The listener records each automatic forward
//! here and the transport waits for the mapping when a post is handled.

use crate::commenter::{ChatRef, MessageRef, TransportError};
use crate::config::{
    DISCUSSION_ROOT_CACHE_MAX_SIZE, DISCUSSION_ROOT_CACHE_TTL_SECS, DISCUSSION_ROOT_INITIAL_WAIT_MS,
    DISCUSSION_ROOT_MAX_RETRIES, DISCUSSION_ROOT_MAX_WAIT_MS,
};
use moka::future::Cache;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tracing::{debug, warn};

/// Shared cache of `(channel, post) -> discussion root`
#[derive(Clone)]
pub struct DiscussionRoots {
    cache: Cache<(ChatRef, MessageRef), MessageRef>,
    max_retries: usize,
}

impl Default for DiscussionRoots {
    fn default() -> Self {
        Self::new(
            DISCUSSION_ROOT_CACHE_MAX_SIZE,
            Duration::from_secs(DISCUSSION_ROOT_CACHE_TTL_SECS),
        )
    }
}

impl DiscussionRoots {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            max_retries: DISCUSSION_ROOT_MAX_RETRIES,
        }
    }

    /// Override how many lookups follow the first miss.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Remember that `post` in `channel` was forwarded as `root`.
    pub async fn record(&self, channel: ChatRef, post: MessageRef, root: MessageRef) {
        debug!(channel = %channel, post = %post, root = %root, "Recorded discussion root");
        self.cache.insert((channel, post), root).await;
    }

    /// Cached root, without waiting.
    pub async fn get(&self, channel: ChatRef, post: MessageRef) -> Option<MessageRef> {
        self.cache.get(&(channel, post)).await
    }

    /// Root of `post`, waiting with backoff for its forward to arrive.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::RootUnavailable` if no forward was seen
    /// within the retry budget.
    pub async fn wait_for(
        &self,
        channel: ChatRef,
        post: MessageRef,
    ) -> Result<MessageRef, TransportError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(DISCUSSION_ROOT_INITIAL_WAIT_MS / 2)
            .max_delay(Duration::from_millis(DISCUSSION_ROOT_MAX_WAIT_MS))
            .take(self.max_retries);

        let roots = self;
        Retry::spawn(strategy, || async move {
            roots
                .get(channel, post)
                .await
                .ok_or(TransportError::RootUnavailable { channel, post })
        })
        .await
        .map_err(|e| {
            warn!(channel = %channel, post = %post, "No automatic forward seen for post");
            e
        })
    }
}
