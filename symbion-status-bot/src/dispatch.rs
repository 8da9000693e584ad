//! Command dispatch and per-message render state
//!
//! Maps inbound updates to bot actions after the allow-list check. Events
//! are handled one at a time by the worker loop in main, which also
//! serializes refreshes per displayed message. Unauthorized and unknown
//! events are dropped without any outbound traffic.

use crate::aggregate::aggregate;
use crate::config::BotConfig;
use crate::keyboard::{
    build_layout, layouts_match, ButtonLayout, ACTION_REFRESH, ACTION_SERVICE_DETAIL_PREFIX,
    ACTION_SHOW_STATUS,
};
use crate::probe::{probe_public_ip, probe_unit_detail};
use crate::telegram::{EditOutcome, Gateway, Update};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const GREETING: &str = "👋 Hello! /status shows the monitored services, /ip the public address.";
const STATUS_HEADER: &str = "🖥 Host services:";
/// answerCallbackQuery caps notification text at 200 characters.
const ACK_TEXT_LIMIT: usize = 190;

/// Static application context, built once at startup. No hidden globals:
/// everything the dispatcher and aggregator need travels through here.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<BotConfig>,
    pub http: reqwest::Client,
}

impl AppContext {
    pub fn new(config: BotConfig) -> Self {
        Self { config: Arc::new(config), http: reqwest::Client::new() }
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.config.probe_timeout_secs)
    }
}

/// Recognized text commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Status,
    Ip,
}

impl Command {
    /// Parse a message text into a command. "/status@somebot" forms count.
    /// Anything unrecognized is None and gets ignored upstream.
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.split('@').next()?;
        match name {
            "/start" => Some(Command::Start),
            "/status" => Some(Command::Status),
            "/ip" => Some(Command::Ip),
            _ => None,
        }
    }
}

/// Button action payloads, parsed once at the dispatcher boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Refresh,
    ShowStatus,
    ServiceDetail(String),
    Unknown(String),
}

impl Action {
    pub fn parse(raw: &str) -> Self {
        if raw == ACTION_REFRESH {
            Action::Refresh
        } else if raw == ACTION_SHOW_STATUS {
            Action::ShowStatus
        } else if let Some(key) = raw.strip_prefix(ACTION_SERVICE_DETAIL_PREFIX) {
            Action::ServiceDetail(key.to_string())
        } else {
            Action::Unknown(raw.to_string())
        }
    }
}

/// Inbound event after decoding a raw update.
#[derive(Debug, Clone)]
pub enum Event {
    Command { chat_id: i64, user_id: i64, command: Command },
    Callback { query_id: String, user_id: i64, chat_id: i64, message_id: i64, action: Action },
}

impl Event {
    /// Decode a Telegram update into an event. Updates we cannot act on
    /// (no sender, no text, callback without a message) are dropped here.
    pub fn from_update(update: Update) -> Option<Self> {
        if let Some(message) = update.message {
            let user_id = message.from?.id;
            let command = Command::parse(&message.text?)?;
            return Some(Event::Command { chat_id: message.chat.id, user_id, command });
        }
        if let Some(query) = update.callback_query {
            let message = query.message?;
            let action = Action::parse(query.data.as_deref().unwrap_or(""));
            return Some(Event::Callback {
                query_id: query.id,
                user_id: query.from.id,
                chat_id: message.chat.id,
                message_id: message.message_id,
                action,
            });
        }
        None
    }

    fn user_id(&self) -> i64 {
        match self {
            Event::Command { user_id, .. } | Event::Callback { user_id, .. } => *user_id,
        }
    }
}

/// The single-worker dispatcher. Owns the per-message render state: one
/// stored layout per (chat, message) pair, written only on a successful
/// send or accepted edit.
pub struct Dispatcher<G: Gateway> {
    ctx: AppContext,
    gateway: G,
    layouts: HashMap<(i64, i64), ButtonLayout>,
}

impl<G: Gateway> Dispatcher<G> {
    pub fn new(ctx: AppContext, gateway: G) -> Self {
        Self { ctx, gateway, layouts: HashMap::new() }
    }

    pub async fn handle_update(&mut self, update: Update) {
        if let Some(event) = Event::from_update(update) {
            self.handle_event(event).await;
        }
    }

    /// Handle one event to completion. Never returns an error: every
    /// failure is either folded into the reply or logged, so one bad
    /// interaction cannot take the loop down.
    pub async fn handle_event(&mut self, event: Event) {
        if !self.ctx.config.is_allowed(event.user_id()) {
            // Deliberate silence: no reply confirms the bot exists.
            debug!("dropping event from unlisted user {}", event.user_id());
            return;
        }

        match event {
            Event::Command { chat_id, command: Command::Start, .. } => {
                self.send_text(chat_id, GREETING).await;
            }
            Event::Command { chat_id, command: Command::Status, .. } => {
                self.send_status(chat_id).await;
            }
            Event::Command { chat_id, command: Command::Ip, .. } => {
                let reply =
                    format_ip_reply(probe_public_ip(&self.ctx.http, self.ctx.probe_timeout()).await);
                self.send_text(chat_id, &reply).await;
            }
            Event::Callback { query_id, chat_id, message_id, action, .. } => match action {
                Action::Refresh => self.refresh(chat_id, message_id, &query_id).await,
                Action::ShowStatus => {
                    self.send_status(chat_id).await;
                    self.ack(&query_id, "", false).await;
                }
                Action::ServiceDetail(key) => self.service_detail(&query_id, &key).await,
                Action::Unknown(raw) => {
                    // Stale buttons survive restarts; ignore what we no
                    // longer understand.
                    debug!("ignoring unknown callback action {raw:?}");
                }
            },
        }
    }

    /// Post a fresh status message with its keyboard and remember the
    /// layout for later differential refreshes.
    async fn send_status(&mut self, chat_id: i64) {
        let snapshot = aggregate(&self.ctx.config.services, self.ctx.probe_timeout()).await;
        let layout = build_layout(&snapshot);
        match self.gateway.send_message(chat_id, STATUS_HEADER, Some(&layout)).await {
            Ok(message_id) => {
                info!("status message {message_id} sent to chat {chat_id}");
                self.layouts.insert((chat_id, message_id), layout);
            }
            Err(e) => error!("failed to send status message: {e}"),
        }
    }

    /// Re-probe everything and edit the keyboard in place, but only when
    /// the labels actually changed. The gateway's own "not modified"
    /// rejection counts as unchanged too.
    async fn refresh(&mut self, chat_id: i64, message_id: i64, query_id: &str) {
        let snapshot = aggregate(&self.ctx.config.services, self.ctx.probe_timeout()).await;
        let next = build_layout(&snapshot);
        let key = (chat_id, message_id);

        // A refresh for a message we have no layout for (restart, stale
        // buttons) is treated as changed and edited defensively.
        let unchanged =
            self.layouts.get(&key).map(|prev| layouts_match(prev, &next)).unwrap_or(false);
        if unchanged {
            self.ack(query_id, "Nothing changed", false).await;
            return;
        }

        match self.gateway.edit_layout(chat_id, message_id, &next).await {
            Ok(EditOutcome::Applied) => {
                self.layouts.insert(key, next);
                self.ack(query_id, "Status updated", false).await;
            }
            Ok(EditOutcome::Unchanged) => {
                self.layouts.insert(key, next);
                self.ack(query_id, "Nothing changed", false).await;
            }
            Err(e) => {
                error!("keyboard edit failed: {e}");
                self.ack(query_id, "Refresh failed, try again", true).await;
            }
        }
    }

    /// Transient detail popup for one service. Does not touch any stored
    /// layout. Unknown keys are ignored on purpose: stale detail buttons
    /// may outlive a configuration change.
    async fn service_detail(&self, query_id: &str, key: &str) {
        let Some(entry) = self.ctx.config.service(key) else {
            debug!("detail request for unknown service key {key:?}");
            return;
        };
        let result = probe_unit_detail(&entry.unit, self.ctx.probe_timeout()).await;
        let text = clip(&result.detail.join("\n"), ACK_TEXT_LIMIT);
        self.ack(query_id, &text, true).await;
    }

    async fn send_text(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.gateway.send_message(chat_id, text, None).await {
            error!("failed to send message to chat {chat_id}: {e}");
        }
    }

    async fn ack(&self, query_id: &str, text: &str, alert: bool) {
        if let Err(e) = self.gateway.acknowledge(query_id, text, alert).await {
            error!("failed to answer callback query: {e}");
        }
    }
}

/// Format the /ip reply. A failed lookup produces an explicit failure
/// message, never an empty address.
fn format_ip_reply(result: anyhow::Result<String>) -> String {
    match result {
        Ok(ip) => format!("🌐 Public IP: {ip}"),
        Err(e) => format!("⚠️ Public IP lookup failed: {e:#}"),
    }
}

/// Truncate to a character limit, marking the cut.
fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}
