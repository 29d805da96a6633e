//! Notification dispatchers.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::info;

use crate::application::notify::{CancellationMessage, NotificationDispatcher, NotifyError};
use crate::config::{NotificationBackend, NotificationSettings};
use crate::domain::orders::CancellationNotice;

use super::error::InfraError;

/// Pick the dispatcher named by configuration.
pub fn build_dispatcher(
    settings: &NotificationSettings,
) -> Result<Arc<dyn NotificationDispatcher>, InfraError> {
    match settings.backend {
        NotificationBackend::Log => Ok(Arc::new(LogDispatcher)),
        NotificationBackend::Webhook => {
            let url = settings.webhook_url.clone().ok_or_else(|| {
                InfraError::configuration("notifications.webhook_url is required for webhook")
            })?;
            let dispatcher =
                WebhookDispatcher::new(url, settings.webhook_token.clone(), settings.timeout)?;
            Ok(Arc::new(dispatcher))
        }
    }
}

/// Writes notices to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send_cancellation(&self, message: CancellationMessage<'_>) -> Result<(), NotifyError> {
        let notice = CancellationNotice::compose(message.order_id, message.reason, message.was_paid);
        info!(
            target = "dishdash::notify",
            order_id = message.order_id,
            to = message.to_address,
            subject = %notice.subject,
            was_paid = message.was_paid,
            "Cancellation notice"
        );
        counter!("dishdash_notification_total", "dispatcher" => "log", "result" => "sent")
            .increment(1);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    kind: &'static str,
    order_id: i64,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
    was_paid: bool,
}

/// Posts notices as JSON to a mail relay.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: Client,
    url: Url,
    token: Option<String>,
}

impl WebhookDispatcher {
    pub fn new(
        url: Url,
        token: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::notification(err.to_string()))?;
        Ok(Self { client, url, token })
    }

    pub fn user_agent() -> &'static str {
        concat!("dishdash/", env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn send_cancellation(&self, message: CancellationMessage<'_>) -> Result<(), NotifyError> {
        let notice = CancellationNotice::compose(message.order_id, message.reason, message.was_paid);
        let payload = WebhookPayload {
            kind: "order_cancelled",
            order_id: message.order_id,
            to: message.to_address,
            subject: &notice.subject,
            body: &notice.body,
            was_paid: message.was_paid,
        };

        let mut request = self.client.post(self.url.clone()).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let result = match request.send().await {
            Err(err) => Err(NotifyError::Transport(err.to_string())),
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                Err(NotifyError::Rejected(format!("status {status} body {text}")))
            }
        };

        let outcome = if result.is_ok() { "sent" } else { "failed" };
        counter!("dishdash_notification_total", "dispatcher" => "webhook", "result" => outcome)
            .increment(1);
        result
    }
}
