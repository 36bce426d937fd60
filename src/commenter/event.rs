//! Transport-neutral inbound event model.
//!
//! The Telegram adapter converts raw updates into these types so the
//! dispatcher never probes transport-specific optional fields.

use std::fmt;

/// Maximum size of an image document that is downloaded for vision input (20 MB)
pub const MAX_IMAGE_BYTES: u32 = 20 * 1024 * 1024;

/// Identifier of a chat (channel, supergroup or discussion group)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatRef(pub i64);

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a message, unique only within its chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageRef(pub i32);

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media attached to an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaAttachment {
    /// Photo (largest available size)
    Photo {
        /// Transport file identifier used for download
        file_id: String,
    },
    /// Video or animation
    Video {
        /// Original file name, if known
        file_name: Option<String>,
    },
    /// Generic document
    Document {
        /// Transport file identifier used for download
        file_id: String,
        /// Original file name, if known
        file_name: Option<String>,
        /// MIME type reported by the transport
        mime_type: Option<String>,
        /// Size in bytes
        size: u32,
    },
    /// Poll
    Poll {
        /// Poll question
        question: String,
    },
    /// Link preview
    WebPage {
        /// Page title
        title: Option<String>,
        /// Page URL
        url: Option<String>,
    },
    /// Anything else (stickers, audio, locations, ...)
    Other {
        /// Human readable kind name
        kind: String,
    },
}

impl MediaAttachment {
    /// Short textual descriptor forwarded to the generator.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Photo { .. } => "Photo".to_string(),
            Self::Video { file_name } => {
                format!("Video: {}", file_name.as_deref().unwrap_or("video"))
            }
            Self::Document { file_name, .. } => {
                format!("Document: {}", file_name.as_deref().unwrap_or("document"))
            }
            Self::Poll { question } => format!("Poll: \"{question}\""),
            Self::WebPage { title, url } => match (title, url) {
                (Some(title), _) if !title.is_empty() => format!("Webpage: \"{title}\""),
                (_, Some(url)) if !url.is_empty() => format!("Webpage: {url}"),
                _ => "Webpage".to_string(),
            },
            Self::Other { kind } => format!("Media of type: {kind}"),
        }
    }

    /// Whether the attachment can be downloaded and sent to a vision model.
    #[must_use]
    pub fn is_image(&self) -> bool {
        match self {
            Self::Photo { .. } => true,
            Self::Document {
                mime_type, size, ..
            } => {
                *size <= MAX_IMAGE_BYTES
                    && mime_type
                        .as_deref()
                        .is_some_and(|mime| mime.starts_with("image/"))
            }
            _ => false,
        }
    }

    /// MIME type used when the attachment is forwarded as an image.
    #[must_use]
    pub fn image_mime_type(&self) -> &str {
        match self {
            Self::Document {
                mime_type: Some(mime),
                ..
            } => mime,
            _ => "image/jpeg",
        }
    }
}

/// Payload shared by every inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Chat the message was posted in; `None` when the update carries no usable origin
    pub chat: Option<ChatRef>,
    /// Message identifier within `chat`
    pub id: MessageRef,
    /// Display name of the author, if any
    pub author: Option<String>,
    /// Text or caption
    pub text: Option<String>,
    /// Root of the discussion thread this message belongs to, if any
    pub thread_root: Option<MessageRef>,
    /// Message this one directly replies to, if any
    pub reply_to: Option<MessageRef>,
    /// Attached media, if any
    pub media: Option<MediaAttachment>,
    /// Service notification (member joined, pinned message, ...)
    pub is_service: bool,
}

impl InboundMessage {
    /// Create a plain text message in `chat`.
    #[must_use]
    pub fn text(chat: ChatRef, id: MessageRef, text: &str) -> Self {
        Self {
            chat: Some(chat),
            id,
            author: None,
            text: Some(text.to_string()),
            thread_root: None,
            reply_to: None,
            media: None,
            is_service: false,
        }
    }

    /// Mark the message as posted inside the thread rooted at `root`.
    #[must_use]
    pub fn in_thread(mut self, root: MessageRef) -> Self {
        self.thread_root = Some(root);
        self
    }

    /// Mark the message as a direct reply to `message`.
    #[must_use]
    pub fn replying_to(mut self, message: MessageRef) -> Self {
        self.reply_to = Some(message);
        self
    }

    /// Attach media.
    #[must_use]
    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media = Some(media);
        self
    }

    /// Text with surrounding whitespace removed, `None` when blank.
    #[must_use]
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// Inbound notification, tagged by where it was observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Post authored in a broadcast channel
    ChannelPost(InboundMessage),
    /// Message in a group or discussion chat
    DiscussionMessage(InboundMessage),
}

impl InboundEvent {
    /// Borrow the message payload.
    #[must_use]
    pub fn message(&self) -> &InboundMessage {
        match self {
            Self::ChannelPost(message) | Self::DiscussionMessage(message) => message,
        }
    }

    /// Take the message payload.
    #[must_use]
    pub fn into_message(self) -> InboundMessage {
        match self {
            Self::ChannelPost(message) | Self::DiscussionMessage(message) => message,
        }
    }
}
