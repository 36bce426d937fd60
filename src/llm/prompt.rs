//! Prompt text for new comments and thread replies.

use crate::commenter::{CommentRequest, MediaInput};
use lazy_regex::lazy_regex;

/// Comment posted when generation fails
pub const FALLBACK_COMMENT: &str = "That's interesting! Thanks for sharing.";

/// Persona used when `SYSTEM_MESSAGE` is not set
pub const DEFAULT_PERSONA: &str = "You are an attentive reader of a Telegram channel. \
Write short, natural comments in the language of the post. \
Never mention that you are an AI.";

/// Stand-in for the text of a post that only carries media
pub const MEDIA_ONLY_PLACEHOLDER: &str = "[Post contains media without text]";

/// Quotation marks removed from generated comments
#[allow(clippy::non_std_lazy_statics)]
static RE_QUOTES: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r#"["«»„“”]"#);

/// User message for one generation request.
#[must_use]
pub fn build_user_prompt(request: &CommentRequest) -> String {
    let text = request.text.trim();
    let mut content = if text.is_empty() {
        MEDIA_ONLY_PLACEHOLDER.to_string()
    } else {
        text.to_string()
    };

    let descriptors: Vec<&str> = request.media.iter().map(MediaInput::description).collect();
    if !descriptors.is_empty() {
        content.push_str("\n\nMedia in post: ");
        content.push_str(&descriptors.join(", "));
    }

    match request.reply_context {
        None => format!(
            "Write a brief comment (1-3 sentences) on this channel post:\n\"{content}\""
        ),
        Some(_) => format!(
            "Someone replied to your comment. Answer them briefly (1-2 sentences):\n\"{content}\""
        ),
    }
}

/// Generated text without quotation marks and surrounding whitespace.
#[must_use]
pub fn clean_comment(text: &str) -> String {
    RE_QUOTES.replace_all(text, "").trim().to_string()
}
