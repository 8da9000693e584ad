//! Telegram Bot API gateway
//!
//! Thin HTTP client over the Bot API: long-polled updates in, messages and
//! keyboard edits out. The dispatcher talks to the [`Gateway`] trait so
//! tests can swap in a recording stub.

use crate::keyboard::ButtonLayout;
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Long-poll window requested from getUpdates.
const POLL_TIMEOUT_SECS: u64 = 25;
/// Per-request timeout for everything that is not a long poll.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a keyboard edit. The Bot API reports an edit carrying no
/// actual change as an error; we fold that case back into ordinary control
/// flow instead of surfacing it as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Unchanged,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("telegram api error {code}: {description}")]
    Api { code: i64, description: String },
}

impl GatewayError {
    /// True for the Bot API's "message is not modified" rejection of a
    /// redundant edit.
    pub fn is_no_change(&self) -> bool {
        match self {
            GatewayError::Api { code: 400, description } => {
                description.contains("message is not modified")
            }
            _ => false,
        }
    }
}

/// Outbound surface the dispatcher needs from the messaging platform.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Send a new message, optionally with an inline keyboard. Returns the
    /// message id of the sent message.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        layout: Option<&ButtonLayout>,
    ) -> Result<i64, GatewayError>;

    /// Replace the inline keyboard attached to an existing message.
    async fn edit_layout(
        &self,
        chat_id: i64,
        message_id: i64,
        layout: &ButtonLayout,
    ) -> Result<EditOutcome, GatewayError>;

    /// Answer a callback query with a transient notification or alert.
    async fn acknowledge(
        &self,
        query_id: &str,
        text: &str,
        alert: bool,
    ) -> Result<(), GatewayError>;
}

// --- wire types -------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

fn markup_from(layout: &ButtonLayout) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: layout
            .iter()
            .map(|row| {
                row.iter()
                    .map(|btn| InlineKeyboardButton {
                        text: btn.label.clone(),
                        callback_data: btn.action_id.clone(),
                    })
                    .collect()
            })
            .collect(),
    }
}

// --- client -----------------------------------------------------------------

/// Bot API client. Cheap to clone (shares the underlying reqwest pool).
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Result<Self> {
        // No global client timeout: getUpdates long-polls well past any
        // sane default. Per-call timeouts are set on each request instead.
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, base: format!("https://api.telegram.org/bot{token}") })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &impl Serialize,
        timeout: Duration,
    ) -> Result<T, GatewayError> {
        let url = format!("{}/{}", self.base, method);
        let response: ApiResponse<T> = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(params)
            .send()
            .await?
            .json()
            .await?;

        if response.ok {
            response.result.ok_or(GatewayError::Api {
                code: 0,
                description: "ok response with no result".to_string(),
            })
        } else {
            Err(GatewayError::Api {
                code: response.error_code.unwrap_or(0),
                description: response.description.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    /// Long-poll for the next batch of updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, GatewayError> {
        #[derive(Serialize)]
        struct Params {
            offset: i64,
            timeout: u64,
            allowed_updates: [&'static str; 2],
        }
        let params = Params {
            offset,
            timeout: POLL_TIMEOUT_SECS,
            allowed_updates: ["message", "callback_query"],
        };
        self.call("getUpdates", &params, Duration::from_secs(POLL_TIMEOUT_SECS + 10)).await
    }
}

#[async_trait]
impl Gateway for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        layout: Option<&ButtonLayout>,
    ) -> Result<i64, GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            chat_id: i64,
            text: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            reply_markup: Option<InlineKeyboardMarkup>,
        }
        let params = Params { chat_id, text, reply_markup: layout.map(markup_from) };
        let message: Message = self.call("sendMessage", &params, CALL_TIMEOUT).await?;
        debug!("sent message {} to chat {}", message.message_id, chat_id);
        Ok(message.message_id)
    }

    async fn edit_layout(
        &self,
        chat_id: i64,
        message_id: i64,
        layout: &ButtonLayout,
    ) -> Result<EditOutcome, GatewayError> {
        #[derive(Serialize)]
        struct Params {
            chat_id: i64,
            message_id: i64,
            reply_markup: InlineKeyboardMarkup,
        }
        let params = Params { chat_id, message_id, reply_markup: markup_from(layout) };
        // editMessageReplyMarkup returns the edited Message; we only need
        // success/failure so the payload is ignored.
        match self.call::<serde_json::Value>("editMessageReplyMarkup", &params, CALL_TIMEOUT).await
        {
            Ok(_) => Ok(EditOutcome::Applied),
            Err(e) if e.is_no_change() => Ok(EditOutcome::Unchanged),
            Err(e) => Err(e),
        }
    }

    async fn acknowledge(
        &self,
        query_id: &str,
        text: &str,
        alert: bool,
    ) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Params<'a> {
            callback_query_id: &'a str,
            text: &'a str,
            show_alert: bool,
        }
        let params = Params { callback_query_id: query_id, text, show_alert: alert };
        self.call::<serde_json::Value>("answerCallbackQuery", &params, CALL_TIMEOUT).await?;
        Ok(())
    }
}

/// Spawn the update poller: long-polls getUpdates and feeds the dispatcher
/// channel. Backs off briefly after transport errors and exits once the
/// receiving side is gone.
pub fn spawn_update_poller(client: TelegramClient, tx: mpsc::Sender<Update>) {
    tokio::spawn(async move {
        let mut offset = 0i64;
        loop {
            match client.get_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if tx.send(update).await.is_err() {
                            return; // dispatcher stopped
                        }
                    }
                }
                Err(e) => {
                    error!("getUpdates failed: {e}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}
