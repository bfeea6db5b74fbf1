use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::llm::ModelInvoker;
use crate::platform::{ChatPlatform, IncomingMessage};

/// Position in the platform's update stream: one past the highest update id
/// seen so far. Unset until the first non-empty batch. Never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor(Option<i64>);

impl Cursor {
    pub fn offset(self) -> Option<i64> {
        self.0
    }

    fn advance_past(self, update_id: i64) -> Self {
        let next = update_id.saturating_add(1);
        Cursor(Some(self.0.map_or(next, |current| current.max(next))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoMessage,
    NoText,
    ChatNotAllowed,
}

/// What happened to a single update. Only logged, never retried.
#[derive(Debug)]
pub enum Outcome {
    Replied,
    Skipped(SkipReason),
    Failed(RelayError),
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub update_id: i64,
    pub outcome: Outcome,
}

/// Polls the chat platform, feeds message text to the model and sends the
/// reply back to the chat it came from. Strictly sequential.
pub struct Relay {
    platform: Box<dyn ChatPlatform>,
    model: Box<dyn ModelInvoker>,
    poll_interval: Duration,
    allowed_chat_ids: Vec<i64>,
}

impl Relay {
    pub fn new(
        platform: Box<dyn ChatPlatform>,
        model: Box<dyn ModelInvoker>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            platform,
            model,
            poll_interval,
            allowed_chat_ids: Vec::new(),
        }
    }

    /// Only answer these chats. Empty means every chat.
    pub fn with_allowed_chats(mut self, chat_ids: Vec<i64>) -> Self {
        self.allowed_chat_ids = chat_ids;
        self
    }

    /// Poll and relay until `shutdown` resolves. Returns the last cursor.
    pub async fn run<F>(&self, shutdown: F) -> Cursor
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cursor = Cursor::default();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                (next, outcomes) = self.run_cycle(cursor) => {
                    cursor = next;
                    log_cycle(cursor, &outcomes);
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Shutdown requested, relay stopped at {:?}", cursor.offset());
        cursor
    }

    /// One fetch-and-dispatch pass. A failed fetch counts as an empty batch
    /// and leaves the cursor where it was.
    pub async fn run_cycle(&self, cursor: Cursor) -> (Cursor, Vec<UpdateOutcome>) {
        let updates = match self.platform.get_updates(cursor.offset()).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Failed to fetch updates: {}", e);
                return (cursor, Vec::new());
            }
        };

        let mut next = cursor;
        let mut outcomes = Vec::with_capacity(updates.len());

        for update in updates {
            next = next.advance_past(update.update_id);

            let outcome = self.dispatch(update.message).await;
            if let Outcome::Failed(e) = &outcome {
                warn!("Failed to relay update {}: {}", update.update_id, e);
            }
            outcomes.push(UpdateOutcome {
                update_id: update.update_id,
                outcome,
            });
        }

        (next, outcomes)
    }

    async fn dispatch(&self, message: Option<IncomingMessage>) -> Outcome {
        let Some(message) = message else {
            return Outcome::Skipped(SkipReason::NoMessage);
        };
        let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) else {
            return Outcome::Skipped(SkipReason::NoText);
        };
        if !self.allowed_chat_ids.is_empty() && !self.allowed_chat_ids.contains(&message.chat_id)
        {
            debug!("Ignoring message from chat {}", message.chat_id);
            return Outcome::Skipped(SkipReason::ChatNotAllowed);
        }

        info!(
            "[User] {} ({}): {}",
            message.user_name.as_deref().unwrap_or("unknown"),
            message.chat_id,
            text
        );

        if let Err(e) = self.platform.send_typing(message.chat_id).await {
            debug!("Typing indicator failed for chat {}: {}", message.chat_id, e);
        }

        match self.reply(message.chat_id, text).await {
            Ok(()) => Outcome::Replied,
            Err(e) => Outcome::Failed(e),
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<(), RelayError> {
        let reply = self.model.invoke(text).await?;
        info!("[Model] {}", reply);
        self.platform.send_message(chat_id, &reply).await
    }
}

fn log_cycle(cursor: Cursor, outcomes: &[UpdateOutcome]) {
    if outcomes.is_empty() {
        return;
    }
    let replied = outcomes
        .iter()
        .filter(|o| matches!(o.outcome, Outcome::Replied))
        .count();
    let failed: Vec<i64> = outcomes
        .iter()
        .filter(|o| matches!(o.outcome, Outcome::Failed(_)))
        .map(|o| o.update_id)
        .collect();
    debug!(
        "Cycle handled {} update(s): {} replied, {} skipped, failed {:?}; next offset {:?}",
        outcomes.len(),
        replied,
        outcomes.len() - replied - failed.len(),
        failed,
        cursor.offset()
    );
}
