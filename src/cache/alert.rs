//! Error reporting: a console log line plus an optional alert sink.

use std::sync::Arc;

use tracing::{error, warn};

use crate::config::{CacheConfig, TelegramConfig};

use super::error::CacheError;
use super::key::CacheKey;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Destination for error alerts.
///
/// Delivery is fire-and-forget: implementations must not block the caller
/// and must only log their own failures.
pub trait AlertSink: Send + Sync {
    fn alert(&self, request_id: &str, message: &str);
}

/// Sends alerts to a Telegram chat through the Bot API.
pub struct TelegramAlert {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
    env: String,
}

impl TelegramAlert {
    pub fn new(config: &TelegramConfig, env: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{TELEGRAM_API}/{}/sendMessage", config.token),
            chat_id: config.chat_id.clone(),
            env: env.into(),
        }
    }

    fn text(&self, request_id: &str, message: &str) -> String {
        format!("[{}][rttp-cache]\nRequestID: {request_id}\n{message}", self.env)
    }
}

impl AlertSink for TelegramAlert {
    fn alert(&self, request_id: &str, message: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(request_id, "no runtime to deliver telegram alert");
            return;
        };

        let request = self.client.get(&self.endpoint).query(&[
            ("chat_id", self.chat_id.as_str()),
            ("text", self.text(request_id, message).as_str()),
            ("parse_mode", "HTML"),
        ]);
        let request_id = request_id.to_owned();

        runtime.spawn(async move {
            match request.send().await {
                Ok(res) if res.status().is_success() => {}
                Ok(res) => warn!(request_id = %request_id, status = res.status().as_u16(), "telegram alert rejected"),
                Err(err) => warn!(request_id = %request_id, error = %err, "telegram alert failed"),
            }
        });
    }
}

/// Logs cache errors and forwards them to the configured sink.
#[derive(Clone, Default)]
pub struct Reporter {
    sink: Option<Arc<dyn AlertSink>>,
}

impl Reporter {
    pub fn new(sink: Option<Arc<dyn AlertSink>>) -> Self {
        Self { sink }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let sink = config
            .alert
            .telegram
            .as_ref()
            .map(|telegram| Arc::new(TelegramAlert::new(telegram, config.env.clone())) as Arc<dyn AlertSink>);
        Self::new(sink)
    }

    pub fn report(&self, request_id: &str, key: Option<&CacheKey>, err: &CacheError) {
        error!(
            request_id,
            kind = err.kind(),
            key = key.map(CacheKey::as_str).unwrap_or("-"),
            error = %err,
            "cache error"
        );

        if let Some(sink) = &self.sink {
            sink.alert(request_id, &format!("{}: {err}", err.kind()));
        }
    }
}
