use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::payloads::GetUpdatesSetters;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, UpdateKind};
use teloxide::RequestError;
use tracing::{debug, error};

use super::{ChatPlatform, IncomingMessage, Update};
use crate::config::TelegramConfig;
use crate::error::RelayError;

/// Telegram has a 4096 character limit per message.
/// We chunk at 4000 to be safe.
const MAX_MESSAGE_LENGTH: usize = 4000;

/// Extra headroom on top of the long-poll timeout before the HTTP client
/// gives up on a getUpdates request.
const HTTP_TIMEOUT_MARGIN_SECS: u64 = 17;

/// Split long messages for Telegram's 4096 char limit
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        // Walk back to a valid UTF-8 char boundary so slicing doesn't panic
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

fn map_request_error(err: RequestError) -> RelayError {
    match &err {
        RequestError::InvalidJson { .. } => RelayError::Parse(err.to_string()),
        _ => RelayError::Transport(err.to_string()),
    }
}

/// Name the failed chunk so a partially delivered reply is visible in the logs.
fn partial_send_error(err: RelayError, index: usize, total: usize) -> RelayError {
    let context = format!(
        "chunk {} of {} ({} already delivered)",
        index + 1,
        total,
        index
    );
    match err {
        RelayError::Parse(message) => RelayError::Parse(format!("{}: {}", context, message)),
        RelayError::Transport(message) => {
            RelayError::Transport(format!("{}: {}", context, message))
        }
        other => other,
    }
}

fn convert_update(update: teloxide::types::Update) -> Update {
    let message = match update.kind {
        UpdateKind::Message(msg) => Some(IncomingMessage {
            chat_id: msg.chat.id.0,
            user_name: msg.from.as_ref().map(|user| user.first_name.clone()),
            text: msg.text().map(str::to_string),
        }),
        _ => None,
    };

    Update {
        update_id: i64::from(update.id.0),
        message,
    }
}

/// Telegram Bot API client driven by explicit `getUpdates` polling.
pub struct TelegramPlatform {
    bot: Bot,
    poll_timeout_secs: u32,
}

impl TelegramPlatform {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let api_url = reqwest::Url::parse(&config.api_url)
            .with_context(|| format!("Invalid Telegram API URL: {}", config.api_url))?;

        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(
                u64::from(config.poll_timeout_secs) + HTTP_TIMEOUT_MARGIN_SECS,
            ))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        let bot = Bot::with_client(&config.bot_token, client).set_api_url(api_url);

        Ok(Self {
            bot,
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, RelayError> {
        let mut request = self.bot.get_updates();
        if let Some(offset) = offset {
            // teloxide carries the offset as i32; ids past i32::MAX cannot be requested.
            let offset = i32::try_from(offset).map_err(|_| {
                error!(
                    "Update offset {} exceeds the i32 range of getUpdates; no further updates can be fetched",
                    offset
                );
                RelayError::Parse(format!("update offset {} out of range", offset))
            })?;
            request = request.offset(offset);
        }
        if self.poll_timeout_secs > 0 {
            request = request.timeout(self.poll_timeout_secs);
        }

        let updates = request.await.map_err(map_request_error)?;
        debug!("getUpdates returned {} update(s)", updates.len());

        Ok(updates.into_iter().map(convert_update).collect())
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), RelayError> {
        let chunks = split_message(text, MAX_MESSAGE_LENGTH);
        let total = chunks.len();
        for (index, chunk) in chunks.into_iter().enumerate() {
            if let Err(e) = self.bot.send_message(ChatId(chat_id), chunk).await {
                let e = map_request_error(e);
                if total == 1 {
                    return Err(e);
                }
                return Err(partial_send_error(e, index, total));
            }
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), RelayError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map_err(map_request_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const TEST_BOT_TOKEN: &str = "test-token";

    /// Telegram method names are case-insensitive; match the request path
    /// regardless of how teloxide spells the method.
    fn method_path(method: &str) -> Matcher {
        Matcher::Regex(format!("(?i)^/bot{}/{}$", TEST_BOT_TOKEN, method))
    }

    fn platform_for(server: &mockito::ServerGuard) -> TelegramPlatform {
        TelegramPlatform::new(&TelegramConfig {
            bot_token: TEST_BOT_TOKEN.to_string(),
            api_url: server.url(),
            ..TelegramConfig::default()
        })
        .unwrap()
    }

    const SENT_MESSAGE: &str = r#"{
        "ok": true,
        "result": {
            "message_id": 10,
            "date": 1706529600,
            "chat": {"id": 42, "type": "private", "first_name": "Ann"},
            "from": {"id": 987654321, "is_bot": true, "first_name": "RelayBot"},
            "text": "ok"
        }
    }"#;

    #[test]
    fn test_short_message_is_single_chunk() {
        assert_eq!(split_message("4", MAX_MESSAGE_LENGTH), vec!["4"]);
    }

    #[test]
    fn test_split_prefers_newlines() {
        let text = format!("{}\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = split_message(&text, 40);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], format!("{}\n", "a".repeat(30)));
        assert_eq!(chunks[1], "b".repeat(30));
    }

    #[test]
    fn test_split_respects_utf8_boundaries() {
        // 'é' is two bytes, so a 5 byte limit cannot land on a boundary evenly
        let text = "é".repeat(10);
        let chunks = split_message(&text, 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn test_get_updates_maps_messages() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", method_path("getUpdates"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                "ok": true,
                "result": [
                    {
                        "update_id": 5,
                        "message": {
                            "message_id": 1,
                            "date": 1706529600,
                            "chat": {"id": 42, "type": "private", "first_name": "Ann"},
                            "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
                            "text": "What is 2+2?"
                        }
                    },
                    {
                        "update_id": 6,
                        "message": {
                            "message_id": 2,
                            "date": 1706529601,
                            "chat": {"id": 42, "type": "private", "first_name": "Ann"},
                            "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
                            "location": {"latitude": 52.52, "longitude": 13.405}
                        }
                    },
                    {
                        "update_id": 7,
                        "edited_message": {
                            "message_id": 1,
                            "date": 1706529600,
                            "edit_date": 1706529700,
                            "chat": {"id": 42, "type": "private", "first_name": "Ann"},
                            "from": {"id": 42, "is_bot": false, "first_name": "Ann"},
                            "text": "What is 3+3?"
                        }
                    }
                ]
            }"#,
            )
            .create_async()
            .await;

        let updates = platform_for(&server).get_updates(None).await.unwrap();
        assert_eq!(updates.len(), 3);

        assert_eq!(updates[0].update_id, 5);
        let first = updates[0].message.as_ref().unwrap();
        assert_eq!(first.chat_id, 42);
        assert_eq!(first.user_name.as_deref(), Some("Ann"));
        assert_eq!(first.text.as_deref(), Some("What is 2+2?"));

        assert_eq!(updates[1].update_id, 6);
        assert_eq!(updates[1].message.as_ref().unwrap().text, None);

        assert_eq!(updates[2].update_id, 7);
        assert!(updates[2].message.is_none());
    }

    #[tokio::test]
    async fn test_get_updates_forwards_offset() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", method_path("getUpdates"))
            .match_body(Matcher::PartialJson(json!({"offset": 8})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true, "result": []}"#)
            .create_async()
            .await;

        let updates = platform_for(&server).get_updates(Some(8)).await.unwrap();
        assert!(updates.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", method_path("getUpdates"))
            .with_status(200)
            .with_body("<html>bad gateway</html>")
            .create_async()
            .await;

        let err = platform_for(&server).get_updates(None).await.unwrap_err();
        assert!(matches!(err, RelayError::Parse(_)));
    }

    #[tokio::test]
    async fn test_api_error_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", method_path("getUpdates"))
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#)
            .create_async()
            .await;

        let err = platform_for(&server).get_updates(None).await.unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }

    #[tokio::test]
    async fn test_send_message_posts_chat_and_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", method_path("sendMessage"))
            .match_body(Matcher::PartialJson(json!({"chat_id": 42, "text": "4"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SENT_MESSAGE)
            .create_async()
            .await;

        platform_for(&server).send_message(42, "4").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_long_reply_is_sent_in_chunks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", method_path("sendMessage"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SENT_MESSAGE)
            .expect(2)
            .create_async()
            .await;

        let reply = "a".repeat(MAX_MESSAGE_LENGTH + 1000);
        platform_for(&server).send_message(42, &reply).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_later_chunk_is_named_in_error() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("POST", method_path("sendMessage"))
            .match_body(Matcher::Regex("a{100}".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SENT_MESSAGE)
            .expect(1)
            .create_async()
            .await;
        let _second = server
            .mock("POST", method_path("sendMessage"))
            .match_body(Matcher::Regex("b{100}".to_string()))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": false, "error_code": 400, "description": "Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let reply = format!("{}{}", "a".repeat(MAX_MESSAGE_LENGTH), "b".repeat(500));
        let err = platform_for(&server)
            .send_message(42, &reply)
            .await
            .unwrap_err();

        match err {
            RelayError::Transport(message) => {
                assert!(message.contains("chunk 2 of 2"), "{message}");
                assert!(message.contains("1 already delivered"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        first.assert_async().await;
    }

    #[tokio::test]
    async fn test_offset_beyond_i32_is_rejected_without_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", method_path("getUpdates"))
            .expect(0)
            .create_async()
            .await;

        let offset = i64::from(i32::MAX) + 1;
        let err = platform_for(&server)
            .get_updates(Some(offset))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Parse(ref message) if message.contains("out of range")));
        mock.assert_async().await;
    }
}
