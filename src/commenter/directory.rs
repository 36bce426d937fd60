//! Resolution of source channels to their discussion destinations.

use super::event::ChatRef;
use super::{ChannelEntity, Transport, TransportError};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// A source channel and the chat comments on its posts go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredChannel {
    /// Handle as configured
    pub handle: String,
    /// Display title
    pub title: String,
    /// Source channel
    pub channel: ChatRef,
    /// Discussion chat, equal to `channel` when the source is itself a group
    pub discussion: ChatRef,
}

impl MonitoredChannel {
    /// Whether the source posts and comments live in the same chat.
    #[must_use]
    pub fn is_self_mapped(&self) -> bool {
        self.channel == self.discussion
    }
}

/// Immutable channel → discussion map built once at startup
#[derive(Debug, Clone, Default)]
pub struct ChannelDirectory {
    channels: HashMap<ChatRef, MonitoredChannel>,
}

impl ChannelDirectory {
    /// Resolve every handle through `transport`.
    ///
    /// Handles that cannot be resolved or have no comment surface are
    /// skipped; the caller decides what an empty directory means.
    pub async fn resolve<T>(transport: &T, handles: &[String]) -> Self
    where
        T: Transport + ?Sized,
    {
        let mut channels = HashMap::new();

        for handle in handles {
            info!(handle = %handle, "Resolving channel");
            match resolve_one(transport, handle).await {
                Ok(Some(entry)) => {
                    if entry.is_self_mapped() {
                        info!(
                            "Resolved group '{}'. Will post comments directly.",
                            entry.title
                        );
                    } else {
                        info!(
                            "Resolved channel '{}'. Will post comments to linked group {}.",
                            entry.title, entry.discussion
                        );
                    }
                    channels.insert(entry.channel, entry);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(handle = %handle, error = %e, "Could not resolve channel, skipping");
                }
            }
        }

        Self { channels }
    }

    /// Build a directory from already resolved entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = MonitoredChannel>) -> Self {
        Self {
            channels: entries
                .into_iter()
                .map(|entry| (entry.channel, entry))
                .collect(),
        }
    }

    /// Entry for a source channel.
    #[must_use]
    pub fn source(&self, channel: ChatRef) -> Option<&MonitoredChannel> {
        self.channels.get(&channel)
    }

    /// Discussion destination of a source channel.
    #[must_use]
    pub fn discussion_for(&self, channel: ChatRef) -> Option<ChatRef> {
        self.source(channel).map(|entry| entry.discussion)
    }

    /// Whether `chat` is the discussion destination of any source.
    #[must_use]
    pub fn is_discussion(&self, chat: ChatRef) -> bool {
        self.channels.values().any(|entry| entry.discussion == chat)
    }

    /// Number of monitored sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether nothing can be monitored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// All monitored sources.
    pub fn entries(&self) -> impl Iterator<Item = &MonitoredChannel> {
        self.channels.values()
    }
}

async fn resolve_one<T>(
    transport: &T,
    handle: &str,
) -> Result<Option<MonitoredChannel>, TransportError>
where
    T: Transport + ?Sized,
{
    let entity: ChannelEntity = transport.resolve_channel(handle).await?;

    let discussion = match transport.linked_discussion(&entity).await? {
        Some(linked) => linked,
        None if entity.is_discussion_group => entity.id,
        None => {
            warn!(
                "Channel '{}' does not appear to have a comment section. Skipping.",
                entity.title
            );
            return Ok(None);
        }
    };

    Ok(Some(MonitoredChannel {
        handle: handle.to_string(),
        title: entity.title,
        channel: entity.id,
        discussion,
    }))
}
