//! Comment orchestration core.
//!
//! Channel resolution, thread ownership, throttling and the dispatcher that
//! ties them together. The chat transport and the text generator are reached
//! only through the [`Transport`] and [`CommentGenerator`] traits.

/// Channel to discussion-destination resolution
pub mod directory;
/// Inbound event state machine
pub mod dispatcher;
/// Transport-neutral event model
pub mod event;
/// Rolling-window comment throttle
pub mod rate_limiter;
/// Bot-owned thread tracking
pub mod threads;

pub use directory::{ChannelDirectory, MonitoredChannel};
pub use dispatcher::{DispatchConfig, DispatchError, DispatchOutcome, DropReason, EventDispatcher};
pub use event::{ChatRef, InboundEvent, InboundMessage, MediaAttachment, MessageRef};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use threads::{ThreadKey, ThreadTracker};

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by the chat transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Handle or chat does not exist or is not visible to the account
    #[error("Not found: {0}")]
    NotFound(String),
    /// Request was rejected by the chat API
    #[error("API error: {0}")]
    Api(String),
    /// Connectivity failure
    #[error("Network error: {0}")]
    Network(String),
    /// The discussion copy of a channel post could not be located
    #[error("Discussion root unavailable for post {post} in {channel}")]
    RootUnavailable {
        /// Channel the post was published in
        channel: ChatRef,
        /// Channel post identifier
        post: MessageRef,
    },
    /// Operation not supported for this input
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// A resolved source channel as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntity {
    /// Chat identifier
    pub id: ChatRef,
    /// Display title
    pub title: String,
    /// Whether the entity itself is a group that accepts comments
    pub is_discussion_group: bool,
}

/// Chat transport consumed by the core
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve a configured handle (`@name` or numeric id) to a chat.
    async fn resolve_channel(&self, handle: &str) -> Result<ChannelEntity, TransportError>;

    /// Linked discussion chat of `channel`, if any.
    async fn linked_discussion(
        &self,
        channel: &ChannelEntity,
    ) -> Result<Option<ChatRef>, TransportError>;

    /// Message in the discussion chat that comments on `post` hang off.
    async fn discussion_root(
        &self,
        post: MessageRef,
        channel: ChatRef,
    ) -> Result<MessageRef, TransportError>;

    /// Download the bytes of `media`.
    async fn download_media(&self, media: &MediaAttachment) -> Result<Vec<u8>, TransportError>;

    /// Send `text` to `destination` as a reply to `reply_to`.
    async fn send_message(
        &self,
        destination: ChatRef,
        text: &str,
        reply_to: MessageRef,
    ) -> Result<MessageRef, TransportError>;
}

/// Media forwarded to the generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaInput {
    /// Textual descriptor ("Photo", "Video: clip.mp4", ...)
    Description(String),
    /// Downloaded image
    Image {
        /// Raw image bytes
        bytes: Vec<u8>,
        /// MIME type of `bytes`
        mime_type: String,
        /// Descriptor used if the model cannot take images
        description: String,
    },
}

impl MediaInput {
    /// Textual descriptor of this input.
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::Description(text) | Self::Image {
                description: text, ..
            } => text,
        }
    }
}

/// Marks a request as the continuation of an existing exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyContext {
    /// Thread the exchange belongs to
    pub thread: ThreadKey,
    /// Bot replies already posted in the thread
    pub replies_so_far: u32,
}

/// Input of one generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRequest {
    /// Post or reply text
    pub text: String,
    /// Attached media, descriptors and images
    pub media: Vec<MediaInput>,
    /// Present when replying inside a bot-owned thread
    pub reply_context: Option<ReplyContext>,
}

impl CommentRequest {
    /// Whether this request continues an existing exchange.
    #[must_use]
    pub const fn is_reply(&self) -> bool {
        self.reply_context.is_some()
    }
}

/// Text generation collaborator
///
/// Implementations must not fail: upstream errors are replaced by a
/// non-empty fallback comment.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommentGenerator: Send + Sync {
    /// Produce comment text for `request`.
    async fn generate(&self, request: CommentRequest) -> String;

    /// Whether [`MediaInput::Image`] inputs are used; when `false` images
    /// are passed as descriptors and never downloaded.
    fn accepts_images(&self) -> bool {
        true
    }
}
