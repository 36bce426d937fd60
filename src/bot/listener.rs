//! Long-polling update listener.
//!
//! Runs beside the dispatcher so that automatic forwards keep filling the
//! discussion root cache while a comment flow is waiting for one.

use crate::bot::discussion::DiscussionRoots;
use crate::bot::media::{forwarded_channel_post, inbound_message};
use crate::commenter::{ChatRef, InboundEvent, MessageRef};
use crate::config::{POLL_ERROR_BACKOFF_SECS, POLL_TIMEOUT_SECS};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, Update, UpdateKind, UserId};
use teloxide::{ApiError, RequestError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the listener does with one update
#[derive(Debug, PartialEq)]
pub enum Route {
    /// Hand to the dispatcher
    Dispatch(InboundEvent),
    /// Automatic forward of `post`; `root` is its copy in the discussion group
    Forward {
        /// Source channel
        channel: ChatRef,
        /// Post id in the channel
        post: MessageRef,
        /// Id of the forwarded copy
        root: MessageRef,
    },
    /// Nothing to do
    Skip,
}

/// Decide the route of a group or private `msg` seen by bot `bot_id`.
#[must_use]
pub fn route_message(msg: &Message, bot_id: UserId) -> Route {
    if let Some((channel, post)) = forwarded_channel_post(msg) {
        return Route::Forward {
            channel,
            post,
            root: MessageRef(msg.id.0),
        };
    }
    if msg.from.as_ref().is_some_and(|user| user.id == bot_id) {
        return Route::Skip;
    }
    Route::Dispatch(InboundEvent::DiscussionMessage(inbound_message(msg)))
}

/// Record the automatic forwards of `updates` in `roots` and return the
/// events to dispatch, in arrival order.
///
/// The whole batch is routed before anything is queued, so a full queue
/// never holds back a root that arrived alongside its post.
pub async fn route_batch(
    updates: Vec<Update>,
    bot_id: UserId,
    roots: &DiscussionRoots,
) -> Vec<InboundEvent> {
    let mut events = Vec::with_capacity(updates.len());
    for update in updates {
        let route = match update.kind {
            UpdateKind::ChannelPost(msg) => {
                Route::Dispatch(InboundEvent::ChannelPost(inbound_message(&msg)))
            }
            UpdateKind::Message(msg) => route_message(&msg, bot_id),
            other => {
                debug!("Ignoring update: {other:?}");
                Route::Skip
            }
        };

        match route {
            Route::Dispatch(event) => events.push(event),
            Route::Forward {
                channel,
                post,
                root,
            } => roots.record(channel, post, root).await,
            Route::Skip => {}
        }
    }
    events
}

/// Converts raw updates and forwards them to the dispatcher
pub struct UpdateListener {
    bot: Bot,
    bot_id: UserId,
    roots: DiscussionRoots,
    events: mpsc::Sender<InboundEvent>,
}

impl UpdateListener {
    /// Create a listener for the bot account `bot_id`.
    #[must_use]
    pub const fn new(
        bot: Bot,
        bot_id: UserId,
        roots: DiscussionRoots,
        events: mpsc::Sender<InboundEvent>,
    ) -> Self {
        Self {
            bot,
            bot_id,
            roots,
            events,
        }
    }

    /// Poll until `cancel` fires, the dispatcher goes away, or another
    /// instance takes over the token.
    ///
    /// Polling pauses while the event queue is full (the dispatcher is
    /// cooling down); Telegram keeps undelivered updates until it resumes.
    /// Automatic forwards in a fetched batch are recorded before any of its
    /// events is queued.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Starting update polling");
        let mut offset: i32 = 0;

        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = self
                    .bot
                    .get_updates()
                    .offset(offset)
                    .timeout(POLL_TIMEOUT_SECS)
                    .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChannelPost]) => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "Got updates");
                    if let Some(last) = updates.last() {
                        offset = last.id.as_offset();
                    }

                    let events = route_batch(updates, self.bot_id, &self.roots).await;
                    for event in events {
                        if self.events.send(event).await.is_err() {
                            info!("Dispatcher gone, stopping update polling");
                            return;
                        }
                    }
                }
                Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                    warn!("Another instance is polling with this token, stopping");
                    cancel.cancel();
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(Duration::from_secs(POLL_ERROR_BACKOFF_SECS)) => {}
                    }
                }
            }
        }

        info!("Update polling stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type TestResult = Result<(), serde_json::Error>;

    const BOT: UserId = UserId(777);

    fn group_chat() -> serde_json::Value {
        json!({"id": -2002, "type": "supergroup", "title": "News chat"})
    }

    #[test]
    fn test_automatic_forward_feeds_root_cache() -> TestResult {
        let channel = json!({"id": -1001, "type": "channel", "title": "News"});
        let msg: Message = serde_json::from_value(json!({
            "message_id": 30,
            "date": 1_700_000_000,
            "chat": group_chat(),
            "sender_chat": channel,
            "is_automatic_forward": true,
            "forward_origin": {
                "type": "channel",
                "chat": channel,
                "message_id": 5,
                "date": 1_700_000_000
            },
            "text": "Release notes"
        }))?;

        assert_eq!(
            route_message(&msg, BOT),
            Route::Forward {
                channel: ChatRef(-1001),
                post: MessageRef(5),
                root: MessageRef(30),
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_records_roots_before_queueing() -> TestResult {
        let channel = json!({"id": -1001, "type": "channel", "title": "News"});
        let updates: Vec<Update> = serde_json::from_str(&json!([
            {
                "update_id": 1,
                "channel_post": {
                    "message_id": 5,
                    "date": 1_700_000_000,
                    "chat": channel,
                    "sender_chat": channel,
                    "text": "Release notes"
                }
            },
            {
                "update_id": 2,
                "message": {
                    "message_id": 30,
                    "date": 1_700_000_000,
                    "chat": group_chat(),
                    "sender_chat": channel,
                    "is_automatic_forward": true,
                    "forward_origin": {
                        "type": "channel",
                        "chat": channel,
                        "message_id": 5,
                        "date": 1_700_000_000
                    },
                    "text": "Release notes"
                }
            },
            {
                "update_id": 3,
                "message": {
                    "message_id": 31,
                    "date": 1_700_000_000,
                    "chat": group_chat(),
                    "from": {"id": 777, "is_bot": true, "first_name": "Commenter"},
                    "text": "Nice post"
                }
            }
        ]).to_string())?;
        let roots = DiscussionRoots::default();

        let events = route_batch(updates, BOT, &roots).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], InboundEvent::ChannelPost(post) if post.id == MessageRef(5)));
        assert_eq!(
            roots.get(ChatRef(-1001), MessageRef(5)).await,
            Some(MessageRef(30))
        );
        Ok(())
    }

    #[test]
    fn test_own_messages_skipped() -> TestResult {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 40,
            "date": 1_700_000_000,
            "chat": group_chat(),
            "from": {"id": 777, "is_bot": true, "first_name": "Commenter"},
            "text": "Nice post"
        }))?;

        assert_eq!(route_message(&msg, BOT), Route::Skip);
        Ok(())
    }

    #[test]
    fn test_user_message_dispatched() -> TestResult {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 41,
            "date": 1_700_000_000,
            "chat": group_chat(),
            "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
            "text": "Why?"
        }))?;

        let Route::Dispatch(InboundEvent::DiscussionMessage(inbound)) = route_message(&msg, BOT)
        else {
            panic!("expected a discussion message");
        };
        assert_eq!(inbound.id, MessageRef(41));
        assert_eq!(inbound.chat, Some(ChatRef(-2002)));
        Ok(())
    }
}
