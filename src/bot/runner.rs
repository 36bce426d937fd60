//! Startup and wiring of the commenter.

use crate::bot::discussion::DiscussionRoots;
use crate::bot::listener::UpdateListener;
use crate::bot::transport::TelegramTransport;
use crate::commenter::{ChannelDirectory, EventDispatcher, RateLimiter, ThreadTracker};
use crate::config::{Settings, EVENT_QUEUE_CAPACITY, POLL_TIMEOUT_SECS};
use crate::llm::OpenRouterCommenter;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::RequestError;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Startup failures that stop the process
#[derive(Debug, Error)]
pub enum StartupError {
    /// `TARGET_CHANNEL` is empty
    #[error("no target channels configured")]
    NoTargets,
    /// None of the configured channels could be monitored
    #[error("no valid channels to monitor")]
    EmptyDirectory,
    /// Telegram rejected a startup request
    #[error("telegram error: {0}")]
    Telegram(#[from] RequestError),
    /// The HTTP client could not be built
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

fn build_bot(token: &str) -> Result<Bot, reqwest::Error> {
    // Long polls must finish before the client gives up on them.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(POLL_TIMEOUT_SECS) + 15))
        .build()?;
    Ok(Bot::with_client(token, client))
}

/// Resolve the configured channels and comment until Ctrl-C.
///
/// # Errors
///
/// Returns a [`StartupError`] if nothing can be monitored or Telegram
/// refuses the bot; runtime failures are logged and skipped.
pub async fn run(settings: Arc<Settings>) -> Result<(), StartupError> {
    let handles = settings.target_channels();
    if handles.is_empty() {
        return Err(StartupError::NoTargets);
    }

    let bot = build_bot(&settings.telegram_token)?;
    let me = bot.get_me().await?;
    info!(
        "Signed in as @{} ({})",
        me.username.as_deref().unwrap_or("unknown"),
        me.id
    );
    bot.delete_webhook().await?;

    let roots = DiscussionRoots::default();
    let transport = Arc::new(TelegramTransport::new(bot.clone(), roots.clone()));

    let directory = ChannelDirectory::resolve(transport.as_ref(), &handles).await;
    if directory.is_empty() {
        error!("No valid channels to monitor");
        return Err(StartupError::EmptyDirectory);
    }
    info!("Monitoring {} channel(s)", directory.len());

    let generator = OpenRouterCommenter::from_settings(&settings);
    if !generator.is_configured() {
        warn!("OPENROUTER_API_KEY is not set, every comment will use the fallback text");
    }

    let rate_limit = settings.rate_limit_config();
    info!(
        "Rate limits: {}/hour, {}/day, {} replies per thread",
        rate_limit.max_per_hour, rate_limit.max_per_day, settings.max_replies_per_thread
    );

    let mut dispatcher = EventDispatcher::new(
        directory,
        RateLimiter::new(rate_limit),
        ThreadTracker::with_ttl(settings.thread_ttl()),
        transport,
        Arc::new(generator),
        settings.dispatch_config(),
    );

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        ctrl_c.cancel();
    });

    let listener = UpdateListener::new(bot, me.id, roots, events_tx);
    let listener_task = tokio::spawn(listener.run(cancel.clone()));

    dispatcher.run(events_rx, cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = listener_task.await {
        warn!("Update listener task failed: {e}");
    }
    info!("Commenter stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_error_messages() {
        assert_eq!(
            StartupError::NoTargets.to_string(),
            "no target channels configured"
        );
        assert_eq!(
            StartupError::EmptyDirectory.to_string(),
            "no valid channels to monitor"
        );
    }

    #[tokio::test]
    async fn test_run_without_targets_fails_before_network() -> Result<(), ::config::ConfigError> {
        let config = ::config::Config::builder()
            .set_override("telegram_token", "0:test")?
            .set_override("target_channel", " , ")?
            .build()?;
        let settings = Settings::from_config(config)?;

        let result = run(Arc::new(settings)).await;

        assert!(matches!(result, Err(StartupError::NoTargets)));
        Ok(())
    }
}
