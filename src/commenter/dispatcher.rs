//! Inbound event state machine.
//!
//! Each event is classified once into [`EventClass`], then handled by
//! exactly one branch. Events are processed one at a time: the dispatcher
//! owns the rate limiter and thread tracker and takes `&mut self`, so a
//! second flow cannot touch them while one is in progress.

use super::directory::ChannelDirectory;
use super::event::{ChatRef, InboundEvent, InboundMessage, MessageRef};
use super::rate_limiter::RateLimiter;
use super::threads::{ThreadKey, ThreadTracker};
use super::{CommentGenerator, CommentRequest, MediaInput, ReplyContext, Transport, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Placeholder content for posts with neither text nor media
pub const EMPTY_CONTENT: &str = "[empty]";

/// Length of the post preview written to the log
const PREVIEW_CHARS: usize = 70;

/// Dispatcher parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum bot replies per thread, the initiating comment included
    pub max_replies_per_thread: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_replies_per_thread: 3,
        }
    }
}

/// Why an event was not acted upon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No usable origin identifier
    Unaddressable,
    /// Service notification rather than a message
    ServiceMessage,
    /// Chat is neither a monitored source nor a discussion destination
    UnmonitoredChat,
    /// Discussion message without reply linkage
    NotAReply,
    /// Reply linkage does not lead to a bot-owned thread
    UntrackedThread,
    /// Thread already reached the per-thread ceiling
    ThreadExhausted {
        /// Exhausted thread
        thread: ThreadKey,
        /// Bot replies already posted
        replies: u32,
    },
}

/// Result of a handled event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// First comment posted on a new post; thread registered
    Commented {
        /// Newly tracked thread
        thread: ThreadKey,
        /// Identifier of the posted comment
        message: MessageRef,
    },
    /// Reply posted inside a bot-owned thread
    Replied {
        /// Thread replied in
        thread: ThreadKey,
        /// Identifier of the posted reply
        message: MessageRef,
        /// Bot replies in the thread after this one
        reply_count: u32,
    },
    /// Event ignored
    Dropped(DropReason),
}

/// Failures of a comment flow
///
/// Both variants leave the rate limiter and thread tracker as if the
/// attempt never happened.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Discussion copy of the post could not be found
    #[error("Discussion root lookup failed: {0}")]
    DiscussionRoot(#[source] TransportError),
    /// Sending the generated comment failed
    #[error("Failed to post comment: {0}")]
    Post(#[source] TransportError),
}

/// Classification of an inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventClass {
    /// New post in a monitored source
    NewPost {
        /// Source channel
        channel: ChatRef,
        /// Discussion destination
        discussion: ChatRef,
        /// The post
        message: InboundMessage,
    },
    /// Message inside a bot-owned thread
    ThreadReply {
        /// Thread the message belongs to
        thread: ThreadKey,
        /// The reply
        message: InboundMessage,
    },
    /// Anything else
    Unrelated(DropReason),
}

/// Routes inbound events to comment flows
pub struct EventDispatcher {
    directory: ChannelDirectory,
    rate_limiter: RateLimiter,
    threads: ThreadTracker,
    transport: Arc<dyn Transport>,
    generator: Arc<dyn CommentGenerator>,
    config: DispatchConfig,
}

impl EventDispatcher {
    /// Assemble a dispatcher from its components.
    #[must_use]
    pub fn new(
        directory: ChannelDirectory,
        rate_limiter: RateLimiter,
        threads: ThreadTracker,
        transport: Arc<dyn Transport>,
        generator: Arc<dyn CommentGenerator>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            directory,
            rate_limiter,
            threads,
            transport,
            generator,
            config,
        }
    }

    /// Channel directory in use.
    #[must_use]
    pub const fn directory(&self) -> &ChannelDirectory {
        &self.directory
    }

    /// Rate limiter state.
    #[must_use]
    pub const fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Thread tracker state.
    #[must_use]
    pub const fn threads(&self) -> &ThreadTracker {
        &self.threads
    }

    /// Consume events until the stream closes or `cancel` fires.
    ///
    /// Flow failures are logged and never stop the loop.
    pub async fn run(&mut self, mut events: mpsc::Receiver<InboundEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    info!("Dispatcher stopped");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        info!("Event stream closed");
                        break;
                    }
                },
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Dispatcher stopped during a comment flow");
                    break;
                }
                result = self.handle(event) => {
                    if let Err(e) = result {
                        error!("Comment flow failed: {e}");
                    }
                }
            }
        }
    }

    /// Classify `event` without side effects.
    #[must_use]
    pub fn classify(&self, event: InboundEvent) -> EventClass {
        let is_channel_post = matches!(event, InboundEvent::ChannelPost(_));
        let message = event.into_message();

        let Some(chat) = message.chat else {
            return EventClass::Unrelated(DropReason::Unaddressable);
        };
        if message.is_service {
            return EventClass::Unrelated(DropReason::ServiceMessage);
        }

        if let Some(source) = self.directory.source(chat) {
            let top_level = message.thread_root.is_none() && message.reply_to.is_none();
            if is_channel_post || (source.is_self_mapped() && top_level) {
                return EventClass::NewPost {
                    channel: chat,
                    discussion: source.discussion,
                    message,
                };
            }
        }

        if is_channel_post || !self.directory.is_discussion(chat) {
            return EventClass::Unrelated(DropReason::UnmonitoredChat);
        }

        if message.thread_root.is_none() && message.reply_to.is_none() {
            return EventClass::Unrelated(DropReason::NotAReply);
        }

        let by_root = message
            .thread_root
            .map(|root| ThreadKey::new(chat, root))
            .filter(|thread| self.threads.is_tracked(thread));
        let thread = by_root.or_else(|| {
            message
                .reply_to
                .and_then(|id| self.threads.thread_for_message(chat, id))
        });

        match thread {
            Some(thread) => EventClass::ThreadReply { thread, message },
            None => EventClass::Unrelated(DropReason::UntrackedThread),
        }
    }

    /// Process one event end to end.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` when the discussion root cannot be found or the
    /// comment cannot be sent. The rate limiter admission is rolled back and
    /// no thread state changes in both cases.
    pub async fn handle(&mut self, event: InboundEvent) -> Result<DispatchOutcome, DispatchError> {
        match self.classify(event) {
            EventClass::NewPost {
                channel,
                discussion,
                message,
            } => self.comment_on_post(channel, discussion, message).await,
            EventClass::ThreadReply { thread, message } => {
                self.reply_in_thread(thread, message).await
            }
            EventClass::Unrelated(reason) => {
                debug!(?reason, "Dropping event");
                Ok(DispatchOutcome::Dropped(reason))
            }
        }
    }

    async fn comment_on_post(
        &mut self,
        channel: ChatRef,
        discussion: ChatRef,
        message: InboundMessage,
    ) -> Result<DispatchOutcome, DispatchError> {
        info!(
            channel = %channel,
            post = %message.id,
            "New post in monitored channel: {}",
            preview(&message)
        );

        self.rate_limiter.admit().await;

        let media = self.collect_media(&message).await;
        let request = CommentRequest {
            text: request_text(&message, &media),
            media,
            reply_context: None,
        };
        let comment = self.generator.generate(request).await;
        info!("Generated comment: {comment}");

        // A group monitored as its own discussion has no forwarded copy.
        let root = if channel == discussion {
            message.id
        } else {
            match self.transport.discussion_root(message.id, channel).await {
                Ok(root) => root,
                Err(e) => {
                    self.rate_limiter.rollback();
                    return Err(DispatchError::DiscussionRoot(e));
                }
            }
        };

        let sent = match self.transport.send_message(discussion, &comment, root).await {
            Ok(sent) => sent,
            Err(e) => {
                self.rate_limiter.rollback();
                return Err(DispatchError::Post(e));
            }
        };

        let thread = ThreadKey::new(discussion, root);
        self.threads.register(thread);
        self.threads.link_message(thread, sent);
        info!(thread = %thread, message = %sent, "Comment posted to discussion group");

        Ok(DispatchOutcome::Commented {
            thread,
            message: sent,
        })
    }

    async fn reply_in_thread(
        &mut self,
        thread: ThreadKey,
        message: InboundMessage,
    ) -> Result<DispatchOutcome, DispatchError> {
        let replies = self.threads.reply_count(&thread);
        if replies >= self.config.max_replies_per_thread {
            info!(
                thread = %thread,
                replies,
                max = self.config.max_replies_per_thread,
                "Thread exhausted, not replying"
            );
            return Ok(DispatchOutcome::Dropped(DropReason::ThreadExhausted {
                thread,
                replies,
            }));
        }

        info!(thread = %thread, message = %message.id, "Reply in bot thread: {}", preview(&message));

        self.rate_limiter.admit().await;

        let media = self.collect_media(&message).await;
        let request = CommentRequest {
            text: request_text(&message, &media),
            media,
            reply_context: Some(ReplyContext {
                thread,
                replies_so_far: replies,
            }),
        };
        let reply = self.generator.generate(request).await;
        info!("Generated reply: {reply}");

        let sent = match self
            .transport
            .send_message(thread.chat, &reply, message.id)
            .await
        {
            Ok(sent) => sent,
            Err(e) => {
                self.rate_limiter.rollback();
                return Err(DispatchError::Post(e));
            }
        };

        self.threads.record_reply(&thread);
        self.threads.link_message(thread, sent);
        let reply_count = self.threads.reply_count(&thread);
        info!(thread = %thread, reply_count, "Reply posted");

        Ok(DispatchOutcome::Replied {
            thread,
            message: sent,
            reply_count,
        })
    }

    async fn collect_media(&self, message: &InboundMessage) -> Vec<MediaInput> {
        let Some(media) = &message.media else {
            return Vec::new();
        };
        let description = media.describe();
        info!("Message contains media: {description}");

        if media.is_image() && self.generator.accepts_images() {
            match self.transport.download_media(media).await {
                Ok(bytes) => {
                    debug!(size = bytes.len(), "Downloaded image");
                    return vec![MediaInput::Image {
                        bytes,
                        mime_type: media.image_mime_type().to_string(),
                        description,
                    }];
                }
                Err(e) => warn!("Image download failed, sending description only: {e}"),
            }
        }

        vec![MediaInput::Description(description)]
    }
}

/// Text forwarded to the generator: the message text, or [`EMPTY_CONTENT`]
/// when there is neither text nor media.
fn request_text(message: &InboundMessage, media: &[MediaInput]) -> String {
    match message.trimmed_text() {
        Some(text) => text.to_string(),
        None if media.is_empty() => EMPTY_CONTENT.to_string(),
        None => String::new(),
    }
}

fn preview(message: &InboundMessage) -> String {
    message.trimmed_text().map_or_else(
        || "[No Text]".to_string(),
        |text| {
            let short = crate::utils::truncate_str(text, PREVIEW_CHARS);
            if short.len() < text.len() {
                format!("\"{short}...\"")
            } else {
                format!("\"{short}\"")
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commenter::directory::MonitoredChannel;
    use crate::commenter::event::MediaAttachment;
    use crate::commenter::rate_limiter::RateLimitConfig;
    use crate::commenter::{MockCommentGenerator, MockTransport};
    use mockall::predicate::{always, eq};
    use std::time::Duration;

    const CHANNEL: ChatRef = ChatRef(-1001);
    const DISCUSSION: ChatRef = ChatRef(-2002);
    const GROUP: ChatRef = ChatRef(-3003);

    fn directory() -> ChannelDirectory {
        ChannelDirectory::from_entries([
            MonitoredChannel {
                handle: "@news".into(),
                title: "News".into(),
                channel: CHANNEL,
                discussion: DISCUSSION,
            },
            MonitoredChannel {
                handle: "@group".into(),
                title: "Group".into(),
                channel: GROUP,
                discussion: GROUP,
            },
        ])
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_per_hour: 8,
            max_per_day: 50,
            initial_delay: Duration::from_secs(1),
            cooldown: Duration::from_secs(1),
        })
    }

    fn dispatcher(transport: MockTransport, generator: MockCommentGenerator) -> EventDispatcher {
        EventDispatcher::new(
            directory(),
            limiter(),
            ThreadTracker::new(),
            Arc::new(transport),
            Arc::new(generator),
            DispatchConfig::default(),
        )
    }

    fn post(id: i32, text: &str) -> InboundEvent {
        InboundEvent::ChannelPost(InboundMessage::text(CHANNEL, MessageRef(id), text))
    }

    #[test]
    fn test_classify_unaddressable_and_service() {
        let d = dispatcher(MockTransport::new(), MockCommentGenerator::new());

        let mut msg = InboundMessage::text(CHANNEL, MessageRef(1), "x");
        msg.chat = None;
        assert_eq!(
            d.classify(InboundEvent::ChannelPost(msg)),
            EventClass::Unrelated(DropReason::Unaddressable)
        );

        let mut msg = InboundMessage::text(CHANNEL, MessageRef(1), "x");
        msg.is_service = true;
        assert_eq!(
            d.classify(InboundEvent::ChannelPost(msg)),
            EventClass::Unrelated(DropReason::ServiceMessage)
        );
    }

    #[test]
    fn test_classify_channel_post_and_unmonitored() {
        let d = dispatcher(MockTransport::new(), MockCommentGenerator::new());

        assert!(matches!(
            d.classify(post(5, "hello")),
            EventClass::NewPost {
                channel: CHANNEL,
                discussion: DISCUSSION,
                ..
            }
        ));

        let other = InboundEvent::ChannelPost(InboundMessage::text(ChatRef(-9), MessageRef(1), "x"));
        assert_eq!(
            d.classify(other),
            EventClass::Unrelated(DropReason::UnmonitoredChat)
        );

        let chatter =
            InboundEvent::DiscussionMessage(InboundMessage::text(DISCUSSION, MessageRef(1), "hi"));
        assert_eq!(d.classify(chatter), EventClass::Unrelated(DropReason::NotAReply));
    }

    #[test]
    fn test_classify_self_mapped_group() {
        let d = dispatcher(MockTransport::new(), MockCommentGenerator::new());

        let top = InboundEvent::DiscussionMessage(InboundMessage::text(GROUP, MessageRef(4), "post"));
        assert!(matches!(d.classify(top), EventClass::NewPost { .. }));

        let reply = InboundEvent::DiscussionMessage(
            InboundMessage::text(GROUP, MessageRef(5), "reply").replying_to(MessageRef(4)),
        );
        assert_eq!(
            d.classify(reply),
            EventClass::Unrelated(DropReason::UntrackedThread)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_post_registers_thread() {
        let mut transport = MockTransport::new();
        transport
            .expect_discussion_root()
            .with(eq(MessageRef(5)), eq(CHANNEL))
            .times(1)
            .returning(|_, _| Ok(MessageRef(50)));
        transport
            .expect_send_message()
            .with(eq(DISCUSSION), eq("Nice post"), eq(MessageRef(50)))
            .times(1)
            .returning(|_, _, _| Ok(MessageRef(51)));

        let mut generator = MockCommentGenerator::new();
        generator
            .expect_generate()
            .withf(|req| req.text == "hello" && req.media.is_empty() && !req.is_reply())
            .times(1)
            .returning(|_| "Nice post".to_string());

        let mut d = dispatcher(transport, generator);
        let outcome = d.handle(post(5, "hello")).await;

        let thread = ThreadKey::new(DISCUSSION, MessageRef(50));
        assert!(matches!(
            outcome,
            Ok(DispatchOutcome::Commented { thread: t, message: MessageRef(51) }) if t == thread
        ));
        assert_eq!(d.threads().reply_count(&thread), 1);
        assert_eq!(d.rate_limiter().hour_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_mapped_post_is_its_own_root() {
        let mut transport = MockTransport::new();
        transport.expect_discussion_root().never();
        transport
            .expect_send_message()
            .with(eq(GROUP), eq("Hi"), eq(MessageRef(4)))
            .times(1)
            .returning(|_, _, _| Ok(MessageRef(5)));

        let mut generator = MockCommentGenerator::new();
        generator.expect_generate().returning(|_| "Hi".to_string());

        let mut d = dispatcher(transport, generator);
        let top = InboundEvent::DiscussionMessage(InboundMessage::text(GROUP, MessageRef(4), "post"));
        d.handle(top).await.ok();

        let thread = ThreadKey::new(GROUP, MessageRef(4));
        assert!(d.threads().is_tracked(&thread));
        assert_eq!(
            d.threads().thread_for_message(GROUP, MessageRef(5)),
            Some(thread)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_closed_stream() {
        let mut transport = MockTransport::new();
        transport
            .expect_discussion_root()
            .returning(|_, _| Ok(MessageRef(20)));
        transport
            .expect_send_message()
            .times(1)
            .returning(|_, _, _| Ok(MessageRef(21)));
        let mut generator = MockCommentGenerator::new();
        generator.expect_generate().returning(|_| "Ok".to_string());

        let mut d = dispatcher(transport, generator);
        let (tx, rx) = mpsc::channel(4);
        tx.send(post(2, "post")).await.ok();
        drop(tx);

        d.run(rx, CancellationToken::new()).await;
        assert_eq!(d.threads().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_post_uses_placeholder() {
        let mut transport = MockTransport::new();
        transport
            .expect_discussion_root()
            .returning(|_, _| Ok(MessageRef(60)));
        transport
            .expect_send_message()
            .returning(|_, _, _| Ok(MessageRef(61)));

        let mut generator = MockCommentGenerator::new();
        generator
            .expect_generate()
            .withf(|req| req.text == EMPTY_CONTENT && req.media.is_empty())
            .times(1)
            .returning(|_| "Hm.".to_string());

        let mut d = dispatcher(transport, generator);
        let mut msg = InboundMessage::text(CHANNEL, MessageRef(6), "");
        msg.text = None;
        let outcome = d.handle(InboundEvent::ChannelPost(msg)).await;

        assert!(matches!(outcome, Ok(DispatchOutcome::Commented { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_and_image_are_both_forwarded() {
        let mut transport = MockTransport::new();
        transport
            .expect_download_media()
            .times(1)
            .returning(|_| Ok(vec![1, 2, 3]));
        transport
            .expect_discussion_root()
            .returning(|_, _| Ok(MessageRef(70)));
        transport
            .expect_send_message()
            .returning(|_, _, _| Ok(MessageRef(71)));

        let mut generator = MockCommentGenerator::new();
        generator
            .expect_generate()
            .withf(|req| {
                req.text == "look"
                    && matches!(
                        req.media.as_slice(),
                        [MediaInput::Image { bytes, mime_type, .. }]
                            if bytes == &vec![1, 2, 3] && mime_type == "image/jpeg"
                    )
            })
            .times(1)
            .returning(|_| "Cool photo".to_string());
        generator.expect_accepts_images().return_const(true);

        let mut d = dispatcher(transport, generator);
        let msg = InboundMessage::text(CHANNEL, MessageRef(7), "look").with_media(
            MediaAttachment::Photo {
                file_id: "photo".into(),
            },
        );
        let outcome = d.handle(InboundEvent::ChannelPost(msg)).await;

        assert!(matches!(outcome, Ok(DispatchOutcome::Commented { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_download_degrades_to_description() {
        let mut transport = MockTransport::new();
        transport
            .expect_download_media()
            .returning(|_| Err(TransportError::Network("timeout".into())));
        transport
            .expect_discussion_root()
            .returning(|_, _| Ok(MessageRef(80)));
        transport
            .expect_send_message()
            .returning(|_, _, _| Ok(MessageRef(81)));

        let mut generator = MockCommentGenerator::new();
        generator
            .expect_generate()
            .withf(|req| {
                req.text.is_empty() && req.media == vec![MediaInput::Description("Photo".into())]
            })
            .times(1)
            .returning(|_| "Nice".to_string());
        generator.expect_accepts_images().return_const(true);

        let mut d = dispatcher(transport, generator);
        let mut msg = InboundMessage::text(CHANNEL, MessageRef(8), "").with_media(
            MediaAttachment::Photo {
                file_id: "photo".into(),
            },
        );
        msg.text = None;

        assert!(d.handle(InboundEvent::ChannelPost(msg)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_only_generator_skips_image_download() {
        let mut transport = MockTransport::new();
        transport.expect_download_media().never();
        transport
            .expect_discussion_root()
            .returning(|_, _| Ok(MessageRef(90)));
        transport
            .expect_send_message()
            .returning(|_, _, _| Ok(MessageRef(91)));

        let mut generator = MockCommentGenerator::new();
        generator.expect_accepts_images().return_const(false);
        generator
            .expect_generate()
            .withf(|req| {
                req.text == "look" && req.media == vec![MediaInput::Description("Photo".into())]
            })
            .times(1)
            .returning(|_| "Nice".to_string());

        let mut d = dispatcher(transport, generator);
        let msg = InboundMessage::text(CHANNEL, MessageRef(9), "look").with_media(
            MediaAttachment::Photo {
                file_id: "photo".into(),
            },
        );

        assert!(d.handle(InboundEvent::ChannelPost(msg)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_rolls_back_and_skips_registration() {
        let mut transport = MockTransport::new();
        transport
            .expect_discussion_root()
            .returning(|_, _| Ok(MessageRef(90)));
        transport
            .expect_send_message()
            .returning(|_, _, _| Err(TransportError::Api("CHAT_WRITE_FORBIDDEN".into())));

        let mut generator = MockCommentGenerator::new();
        generator
            .expect_generate()
            .returning(|_| "Comment".to_string());

        let mut d = dispatcher(transport, generator);
        let outcome = d.handle(post(9, "post")).await;

        assert!(matches!(outcome, Err(DispatchError::Post(_))));
        assert!(!d.threads().is_tracked(&ThreadKey::new(DISCUSSION, MessageRef(90))));
        assert_eq!(d.rate_limiter().hour_len(), 0);
        assert_eq!(d.rate_limiter().day_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_root_lookup_failure_abandons_post() {
        let mut transport = MockTransport::new();
        transport.expect_discussion_root().returning(|post, channel| {
            Err(TransportError::RootUnavailable { channel, post })
        });
        transport.expect_send_message().never();

        let mut generator = MockCommentGenerator::new();
        generator
            .expect_generate()
            .returning(|_| "Comment".to_string());

        let mut d = dispatcher(transport, generator);
        let outcome = d.handle(post(10, "post")).await;

        assert!(matches!(outcome, Err(DispatchError::DiscussionRoot(_))));
        assert!(d.threads().is_empty());
        assert_eq!(d.rate_limiter().hour_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replies_until_thread_exhausted() {
        let mut transport = MockTransport::new();
        transport
            .expect_discussion_root()
            .returning(|_, _| Ok(MessageRef(100)));
        let mut next_id = 100;
        transport
            .expect_send_message()
            .with(eq(DISCUSSION), always(), always())
            .times(3)
            .returning(move |_, _, _| {
                next_id += 1;
                Ok(MessageRef(next_id))
            });

        let mut generator = MockCommentGenerator::new();
        generator
            .expect_generate()
            .withf(|req| !req.is_reply())
            .times(1)
            .returning(|_| "First".to_string());
        generator
            .expect_generate()
            .withf(|req| req.is_reply())
            .times(2)
            .returning(|_| "Again".to_string());

        let mut d = dispatcher(transport, generator);
        d.handle(post(1, "post")).await.ok();

        let thread = ThreadKey::new(DISCUSSION, MessageRef(100));
        for (id, expected) in [(200, 2), (201, 3)] {
            let reply = InboundEvent::DiscussionMessage(
                InboundMessage::text(DISCUSSION, MessageRef(id), "why?")
                    .in_thread(MessageRef(100)),
            );
            let outcome = d.handle(reply).await;
            assert!(matches!(
                outcome,
                Ok(DispatchOutcome::Replied { reply_count, .. }) if reply_count == expected
            ));
        }

        let fourth = InboundEvent::DiscussionMessage(
            InboundMessage::text(DISCUSSION, MessageRef(202), "and?").in_thread(MessageRef(100)),
        );
        let outcome = d.handle(fourth).await;
        assert!(matches!(
            outcome,
            Ok(DispatchOutcome::Dropped(DropReason::ThreadExhausted { replies: 3, .. }))
        ));
        assert_eq!(d.threads().reply_count(&thread), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_targets_triggering_message() {
        let mut transport = MockTransport::new();
        transport
            .expect_discussion_root()
            .returning(|_, _| Ok(MessageRef(300)));
        transport
            .expect_send_message()
            .with(eq(DISCUSSION), always(), eq(MessageRef(300)))
            .times(1)
            .returning(|_, _, _| Ok(MessageRef(301)));
        transport
            .expect_send_message()
            .with(eq(DISCUSSION), eq("Reply"), eq(MessageRef(302)))
            .times(1)
            .returning(|_, _, _| Err(TransportError::Network("reset".into())));

        let mut generator = MockCommentGenerator::new();
        generator
            .expect_generate()
            .withf(|req| !req.is_reply())
            .returning(|_| "First".to_string());
        generator
            .expect_generate()
            .withf(|req| {
                req.reply_context.is_some_and(|ctx| ctx.replies_so_far == 1) && req.text == "hey"
            })
            .returning(|_| "Reply".to_string());

        let mut d = dispatcher(transport, generator);
        d.handle(post(3, "post")).await.ok();
        let hour_before = d.rate_limiter().hour_len();

        // Reply linked only through the bot's own comment.
        let reply = InboundEvent::DiscussionMessage(
            InboundMessage::text(DISCUSSION, MessageRef(302), "hey").replying_to(MessageRef(301)),
        );
        let outcome = d.handle(reply).await;

        assert!(matches!(outcome, Err(DispatchError::Post(_))));
        assert_eq!(
            d.threads().reply_count(&ThreadKey::new(DISCUSSION, MessageRef(300))),
            1
        );
        assert_eq!(d.rate_limiter().hour_len(), hour_before);
    }

    #[test]
    fn test_request_text_rules() {
        let msg = InboundMessage::text(CHANNEL, MessageRef(1), "  ");
        assert_eq!(request_text(&msg, &[]), EMPTY_CONTENT);
        assert_eq!(
            request_text(&msg, &[MediaInput::Description("Photo".into())]),
            ""
        );
        let msg = InboundMessage::text(CHANNEL, MessageRef(1), " text ");
        assert_eq!(request_text(&msg, &[]), "text");
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "a".repeat(100);
        let msg = InboundMessage::text(CHANNEL, MessageRef(1), &long);
        assert_eq!(preview(&msg), format!("\"{}...\"", "a".repeat(70)));

        let mut empty = InboundMessage::text(CHANNEL, MessageRef(1), "");
        empty.text = None;
        assert_eq!(preview(&empty), "[No Text]");
    }
}
