use crate::bot::discussion::DiscussionRoots;
use crate::bot::resilient::{download_file_resilient, send_reply_resilient};
use crate::commenter::{
    ChannelEntity, ChatRef, MediaAttachment, MessageRef, Transport, TransportError,
};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageId, Recipient};
use teloxide::{ApiError, RequestError};
use tracing::debug;

/// [`Transport`] over the Telegram Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    roots: DiscussionRoots,
}

impl TelegramTransport {
    /// Wrap `bot`; discussion roots are read from `roots`, which the update
    /// listener fills.
    #[must_use]
    pub const fn new(bot: Bot, roots: DiscussionRoots) -> Self {
        Self { bot, roots }
    }
}

/// `@name` handles resolve by username, numeric handles by chat id.
fn recipient(handle: &str) -> Recipient {
    let handle = handle.trim();
    match handle.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if handle.starts_with('@') => Recipient::ChannelUsername(handle.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{handle}")),
    }
}

fn map_request_error(error: RequestError) -> TransportError {
    match error {
        RequestError::Api(ApiError::ChatNotFound) => TransportError::NotFound(error.to_string()),
        RequestError::Network(_) | RequestError::Io(_) => {
            TransportError::Network(error.to_string())
        }
        other => TransportError::Api(other.to_string()),
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn resolve_channel(&self, handle: &str) -> Result<ChannelEntity, TransportError> {
        let chat = self
            .bot
            .get_chat(recipient(handle))
            .await
            .map_err(map_request_error)?;

        Ok(ChannelEntity {
            id: ChatRef(chat.id.0),
            title: chat.title().unwrap_or(handle).to_string(),
            is_discussion_group: chat.is_supergroup(),
        })
    }

    async fn linked_discussion(
        &self,
        channel: &ChannelEntity,
    ) -> Result<Option<ChatRef>, TransportError> {
        let chat = self
            .bot
            .get_chat(ChatId(channel.id.0))
            .await
            .map_err(map_request_error)?;
        Ok(chat.linked_chat_id().map(ChatRef))
    }

    async fn discussion_root(
        &self,
        post: MessageRef,
        channel: ChatRef,
    ) -> Result<MessageRef, TransportError> {
        self.roots.wait_for(channel, post).await
    }

    async fn download_media(&self, media: &MediaAttachment) -> Result<Vec<u8>, TransportError> {
        let file_id = match media {
            MediaAttachment::Photo { file_id } | MediaAttachment::Document { file_id, .. } => {
                file_id
            }
            other => {
                return Err(TransportError::Unsupported(format!(
                    "cannot download {}",
                    other.describe()
                )))
            }
        };

        let bytes = download_file_resilient(&self.bot, file_id)
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        debug!(size = bytes.len(), "Downloaded media");
        Ok(bytes)
    }

    async fn send_message(
        &self,
        destination: ChatRef,
        text: &str,
        reply_to: MessageRef,
    ) -> Result<MessageRef, TransportError> {
        let sent = send_reply_resilient(
            &self.bot,
            ChatId(destination.0),
            text,
            MessageId(reply_to.0),
        )
        .await
        .map_err(map_request_error)?;
        Ok(MessageRef(sent.id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_forms() {
        assert_eq!(recipient("-1001234"), Recipient::Id(ChatId(-1_001_234)));
        assert_eq!(
            recipient("@news"),
            Recipient::ChannelUsername("@news".to_string())
        );
        assert_eq!(
            recipient(" news "),
            Recipient::ChannelUsername("@news".to_string())
        );
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_request_error(RequestError::Api(ApiError::ChatNotFound)),
            TransportError::NotFound(_)
        ));
        assert!(matches!(
            map_request_error(RequestError::Api(ApiError::BotKicked)),
            TransportError::Api(_)
        ));
    }

    #[tokio::test]
    async fn test_non_image_media_is_unsupported() {
        let transport = TelegramTransport::new(Bot::new("0:test"), DiscussionRoots::default());
        let result = transport
            .download_media(&MediaAttachment::Poll {
                question: "Why?".to_string(),
            })
            .await;
        assert!(matches!(result, Err(TransportError::Unsupported(_))));
    }
}
