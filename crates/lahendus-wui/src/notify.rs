//! Inline user messages.

use lahendus_spa::{values, Env, Result};

use crate::templates::MESSAGES_ID;

/// Kind of message, used as a CSS class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Something worked.
    Success,
    /// Something failed.
    Error,
}

impl MessageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Replaces the current message.
pub fn show_message(env: &Env, kind: MessageKind, text: &str) -> Result<()> {
    let html = env.render(
        "t-message",
        &values([("kind", kind.as_str().into()), ("text", text.into())]),
    )?;
    env.dom().set_inner_html(MESSAGES_ID, &html)
}

/// Shows a message, logging instead of failing if it cannot be painted.
pub fn show_message_or_log(env: &Env, kind: MessageKind, text: &str) {
    if let Err(e) = show_message(env, kind, text) {
        tracing::warn!(error = %e, text, "Failed to show message");
    }
}
