//! Conversion of Telegram messages into inbound events
//!
//! Extracts text, reply linkage and a single media attachment from a
//! teloxide [`Message`].

use crate::commenter::{ChatRef, InboundMessage, MediaAttachment, MessageRef};
use teloxide::types::{
    LinkPreviewOptions, MediaKind, MediaText, Message, MessageCommon, MessageKind, MessageOrigin,
};

/// Build the transport-neutral view of `msg`.
#[must_use]
pub fn inbound_message(msg: &Message) -> InboundMessage {
    InboundMessage {
        chat: Some(ChatRef(msg.chat.id.0)),
        id: MessageRef(msg.id.0),
        author: author(msg),
        text: msg.text().or_else(|| msg.caption()).map(ToString::to_string),
        thread_root: msg.thread_id.map(|thread| MessageRef(thread.0 .0)),
        reply_to: msg.reply_to_message().map(|reply| MessageRef(reply.id.0)),
        media: media_attachment(msg),
        is_service: !matches!(msg.kind, MessageKind::Common(_)),
    }
}

/// Source channel post of an automatic forward into a discussion group.
#[must_use]
pub fn forwarded_channel_post(msg: &Message) -> Option<(ChatRef, MessageRef)> {
    let MessageKind::Common(MessageCommon {
        is_automatic_forward: true,
        forward_origin: Some(MessageOrigin::Channel {
            chat, message_id, ..
        }),
        ..
    }) = &msg.kind
    else {
        return None;
    };
    Some((ChatRef(chat.id.0), MessageRef(message_id.0)))
}

fn author(msg: &Message) -> Option<String> {
    if let Some(user) = &msg.from {
        return Some(user.full_name());
    }
    msg.sender_chat
        .as_ref()
        .and_then(|chat| chat.title())
        .map(ToString::to_string)
}

/// Media attached to `msg`, if any.
#[must_use]
pub fn media_attachment(msg: &Message) -> Option<MediaAttachment> {
    if let Some(photos) = msg.photo() {
        return photos.last().map(|photo| MediaAttachment::Photo {
            file_id: photo.file.id.0.clone(),
        });
    }
    if let Some(video) = msg.video() {
        return Some(MediaAttachment::Video {
            file_name: video.file_name.clone(),
        });
    }
    if let Some(animation) = msg.animation() {
        return Some(MediaAttachment::Video {
            file_name: animation.file_name.clone(),
        });
    }
    if let Some(doc) = msg.document() {
        return Some(MediaAttachment::Document {
            file_id: doc.file.id.0.clone(),
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.as_ref().map(ToString::to_string),
            size: doc.file.size,
        });
    }
    if let Some(poll) = msg.poll() {
        return Some(MediaAttachment::Poll {
            question: poll.question.clone(),
        });
    }
    if let Some(kind) = other_media_kind(msg) {
        return Some(MediaAttachment::Other {
            kind: kind.to_string(),
        });
    }
    link_preview(msg)
}

fn other_media_kind(msg: &Message) -> Option<&'static str> {
    if msg.sticker().is_some() {
        Some("Sticker")
    } else if msg.audio().is_some() {
        Some("Audio")
    } else if msg.voice().is_some() {
        Some("Voice")
    } else if msg.video_note().is_some() {
        Some("VideoNote")
    } else if msg.location().is_some() {
        Some("Location")
    } else if msg.contact().is_some() {
        Some("Contact")
    } else {
        None
    }
}

fn link_preview(msg: &Message) -> Option<MediaAttachment> {
    let MessageKind::Common(MessageCommon {
        media_kind:
            MediaKind::Text(MediaText {
                link_preview_options:
                    Some(LinkPreviewOptions {
                        is_disabled: false,
                        url,
                        ..
                    }),
                ..
            }),
        ..
    }) = &msg.kind
    else {
        return None;
    };
    Some(MediaAttachment::WebPage {
        title: None,
        url: url.clone(),
    })
}
