//! Retry helpers for Telegram calls and small string utilities.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use channel_commenter::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

fn telegram_backoff() -> impl Iterator<Item = Duration> {
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    ExponentialBackoff::from_millis(2)
        .factor(TELEGRAM_API_INITIAL_BACKOFF_MS / 2)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES)
}

/// Retry a Telegram API operation with exponential backoff.
///
/// Delays start at 500ms and double up to 4s, with jitter; at most
/// `TELEGRAM_API_MAX_RETRIES` retries follow the first attempt.
///
/// # Errors
///
/// Returns the last error once every attempt has failed.
///
/// # Examples
///
/// ```no_run
/// use channel_commenter::utils::retry_telegram_operation;
///
/// async fn download_file() -> anyhow::Result<Vec<u8>> {
///     Ok(vec![])
/// }
///
/// # async fn example() -> anyhow::Result<()> {
/// let buffer = retry_telegram_operation(|| async { download_file().await }).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_telegram_operation<F, Fut, T, E>(operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_telegram_operation_if(operation, |_: &E| true).await
}

/// Like [`retry_telegram_operation`], but only errors accepted by
/// `is_transient` are retried; any other error is returned immediately.
///
/// # Errors
///
/// Returns the first non-transient error, or the last error once every
/// attempt has failed.
pub async fn retry_telegram_operation_if<F, Fut, T, E, C>(
    operation: F,
    is_transient: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    C: FnMut(&E) -> bool,
{
    RetryIf::spawn(telegram_backoff(), operation, is_transient)
        .await
        .map_err(|e| {
            warn!("Telegram API operation failed: {e}");
            e
        })
}
