//! Telegram calls with automatic retry on transient network failures.
//!
//! Only connectivity errors are retried; API rejections (missing rights,
//! deleted messages, flood limits) surface immediately.

use crate::utils::{retry_telegram_operation, retry_telegram_operation_if};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, Message, MessageId, ReplyParameters};
use teloxide::RequestError;

/// Whether `error` is worth another attempt.
#[must_use]
pub const fn is_transient(error: &RequestError) -> bool {
    matches!(error, RequestError::Network(_) | RequestError::Io(_))
}

/// Send `text` to `chat_id` as a reply to `reply_to`, retrying on network
/// failures.
///
/// # Errors
///
/// Returns the API error, or the last network error after all retries.
pub async fn send_reply_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    reply_to: MessageId,
) -> Result<Message, RequestError> {
    retry_telegram_operation_if(
        || async move {
            bot.send_message(chat_id, text)
                .reply_parameters(ReplyParameters::new(reply_to))
                .await
        },
        is_transient,
    )
    .await
}

/// Download a file by id, retrying both steps on any failure.
///
/// # Errors
///
/// Returns the last lookup or download error after all retries.
pub async fn download_file_resilient(bot: &Bot, file_id: &str) -> anyhow::Result<Vec<u8>> {
    retry_telegram_operation(|| async move {
        let file = bot.get_file(FileId(file_id.to_string())).await?;
        let mut buf = Vec::new();
        bot.download_file(&file.path, &mut buf).await?;
        Ok::<_, anyhow::Error>(buf)
    })
    .await
}
