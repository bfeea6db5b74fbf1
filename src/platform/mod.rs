pub mod telegram;

use async_trait::async_trait;

use crate::error::RelayError;

/// One event from the platform's update stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub update_id: i64,
    /// `None` for every update kind other than a new message.
    pub message: Option<IncomingMessage>,
}

/// A message received from the platform
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Chat the reply goes back to
    pub chat_id: i64,
    /// Display name of the sender, for logging only
    pub user_name: Option<String>,
    /// The message text, absent for media, stickers, etc.
    pub text: Option<String>,
}

#[cfg(test)]
impl Update {
    pub fn text_message(update_id: i64, chat_id: i64, text: &str) -> Self {
        Self {
            update_id,
            message: Some(IncomingMessage {
                chat_id,
                user_name: None,
                text: Some(text.to_string()),
            }),
        }
    }
}

/// The chat side of the relay.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Fetch updates with `update_id >= offset`, or the whole retained
    /// backlog when `offset` is `None`.
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, RelayError>;

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), RelayError>;

    /// Best-effort "typing..." indicator.
    async fn send_typing(&self, _chat_id: i64) -> Result<(), RelayError> {
        Ok(())
    }
}
