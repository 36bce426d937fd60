//! Ownership tracking for comment threads started by the bot.

use super::event::{ChatRef, MessageRef};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Identity of a discussion thread: discussion chat plus root message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    /// Discussion chat the thread lives in
    pub chat: ChatRef,
    /// Message the bot's first comment replied to
    pub root: MessageRef,
}

impl ThreadKey {
    /// Build a key.
    #[must_use]
    pub const fn new(chat: ChatRef, root: MessageRef) -> Self {
        Self { chat, root }
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat, self.root)
    }
}

/// A thread the bot has initiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadRecord {
    /// Bot-authored replies posted in the thread, the initiating comment included
    pub reply_count: u32,
    last_activity: Instant,
}

/// Records bot-owned threads and their reply counters
#[derive(Debug, Default)]
pub struct ThreadTracker {
    threads: HashMap<ThreadKey, ThreadRecord>,
    // bot-authored message -> thread it was posted in
    bot_messages: HashMap<(ChatRef, MessageRef), ThreadKey>,
    ttl: Option<Duration>,
}

impl ThreadTracker {
    /// Tracker that keeps every thread for the process lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker that forgets threads idle for longer than `ttl`.
    #[must_use]
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            threads: HashMap::new(),
            bot_messages: HashMap::new(),
            ttl,
        }
    }

    /// Mark `key` as bot-owned with one reply (the initiating comment).
    ///
    /// A repeated registration overwrites the existing record.
    pub fn register(&mut self, key: ThreadKey) {
        self.evict_expired();
        self.threads.insert(
            key,
            ThreadRecord {
                reply_count: 1,
                last_activity: Instant::now(),
            },
        );
        debug!(thread = %key, tracked = self.threads.len(), "Registered thread");
    }

    /// Whether `key` is a bot-owned thread.
    #[must_use]
    pub fn is_tracked(&self, key: &ThreadKey) -> bool {
        self.live(key).is_some()
    }

    /// Bot replies posted in `key`, 0 for unknown threads.
    #[must_use]
    pub fn reply_count(&self, key: &ThreadKey) -> u32 {
        self.live(key).map_or(0, |record| record.reply_count)
    }

    /// Count one more bot reply in an already tracked thread.
    ///
    /// Untracked threads are left untouched.
    pub fn record_reply(&mut self, key: &ThreadKey) {
        if !self.is_tracked(key) {
            debug!(thread = %key, "Ignoring reply for untracked thread");
            return;
        }
        if let Some(record) = self.threads.get_mut(key) {
            record.reply_count += 1;
            record.last_activity = Instant::now();
        }
    }

    /// Remember that the bot posted `message` inside `thread`.
    ///
    /// Lets replies that only carry a direct reply linkage to a bot message
    /// be attributed to the thread.
    pub fn link_message(&mut self, thread: ThreadKey, message: MessageRef) {
        if self.is_tracked(&thread) {
            self.bot_messages.insert((thread.chat, message), thread);
        }
    }

    /// Tracked thread containing the bot message `message` in `chat`.
    #[must_use]
    pub fn thread_for_message(&self, chat: ChatRef, message: MessageRef) -> Option<ThreadKey> {
        self.bot_messages
            .get(&(chat, message))
            .copied()
            .filter(|thread| self.is_tracked(thread))
    }

    /// Number of records held, expired ones included until the next eviction.
    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Whether no thread is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    fn live(&self, key: &ThreadKey) -> Option<&ThreadRecord> {
        self.threads
            .get(key)
            .filter(|record| !self.is_expired(record, Instant::now()))
    }

    fn is_expired(&self, record: &ThreadRecord, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(record.last_activity) >= ttl)
    }

    fn evict_expired(&mut self) {
        let Some(ttl) = self.ttl else {
            return;
        };
        let now = Instant::now();
        let before = self.threads.len();
        self.threads
            .retain(|_, record| now.saturating_duration_since(record.last_activity) < ttl);
        let threads = &self.threads;
        self.bot_messages
            .retain(|_, thread| threads.contains_key(thread));
        let evicted = before - self.threads.len();
        if evicted > 0 {
            debug!(evicted, "Evicted idle threads");
        }
    }
}
