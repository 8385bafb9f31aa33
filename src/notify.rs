//! Failure notifications — operator alerts and partner-facing error mail.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::{error, warn};

use crate::error::NotifyError;
use crate::partners::PartnerDirectory;

/// Named-category alert channel for operators.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, category: &str, text: &str) -> Result<(), NotifyError>;
}

/// Telegram bot sink for the operator alert channel.
pub struct TelegramAlerts {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramAlerts {
    pub fn new(bot_token: &str, chat_id: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }
}

#[async_trait]
impl AlertSink for TelegramAlerts {
    async fn send_alert(&self, category: &str, text: &str) -> Result<(), NotifyError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": format!("[{category}] {text}"),
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Alert(e.to_string()))?;
        if !response.status().is_success() {
            return Err(NotifyError::Alert(format!(
                "telegram returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Fallback sink when no bot token is configured: alerts go to the log.
pub struct LogAlerts;

#[async_trait]
impl AlertSink for LogAlerts {
    async fn send_alert(&self, category: &str, text: &str) -> Result<(), NotifyError> {
        error!(category, "{text}");
        Ok(())
    }
}

/// Partner-facing mailer for order errors.
#[async_trait]
pub trait PartnerMailer: Send + Sync {
    async fn send_order_error(
        &self,
        to: &str,
        message: &str,
        order_label: &str,
    ) -> Result<(), NotifyError>;
}

/// SMTP mailer built from intake configuration.
pub struct SmtpPartnerMailer {
    host: String,
    port: u16,
    username: String,
    password: String,
    from: String,
}

impl SmtpPartnerMailer {
    pub fn new(host: &str, port: u16, username: &str, password: &str, from: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl PartnerMailer for SmtpPartnerMailer {
    async fn send_order_error(
        &self,
        to: &str,
        message: &str,
        order_label: &str,
    ) -> Result<(), NotifyError> {
        let creds = Credentials::new(self.username.clone(), self.password.clone());
        let transport = SmtpTransport::relay(&self.host)
            .map_err(|e| NotifyError::Mail(format!("SMTP relay error: {e}")))?
            .port(self.port)
            .credentials(creds)
            .build();

        let email = Message::builder()
            .from(self.from.parse().map_err(|e| NotifyError::Address {
                address: self.from.clone(),
                reason: format!("{e}"),
            })?)
            .to(to.parse().map_err(|e| NotifyError::Address {
                address: to.to_string(),
                reason: format!("{e}"),
            })?)
            .subject(format!("Ошибка создания заявки {order_label}"))
            .body(format!(
                "Не удалось создать заявку {order_label}: {message}"
            ))
            .map_err(|e| NotifyError::Mail(format!("Failed to build email: {e}")))?;

        transport
            .send(&email)
            .map_err(|e| NotifyError::Mail(format!("SMTP send failed: {e}")))?;
        Ok(())
    }
}

/// Routes a message failure to the operator channel and, for duplicate
/// orders, to the owning partner's configured addresses.
pub struct ErrorNotifier {
    alerts: Arc<dyn AlertSink>,
    mailer: Arc<dyn PartnerMailer>,
    partners: Arc<PartnerDirectory>,
}

impl ErrorNotifier {
    pub fn new(
        alerts: Arc<dyn AlertSink>,
        mailer: Arc<dyn PartnerMailer>,
        partners: Arc<PartnerDirectory>,
    ) -> Self {
        Self {
            alerts,
            mailer,
            partners,
        }
    }

    /// Forward a failure to the operator alert channel, tagged with the
    /// message number. Best effort.
    pub async fn alert_operator(&self, seq: u32, error_text: &str) {
        let text = format!("Письмо #{seq}: {error_text}");
        if let Err(e) = self.alerts.send_alert("mail_error", &text).await {
            error!("Failed to send operator alert: {e}");
        }
    }

    /// Mail every configured address of the partner owning `wms_id`.
    /// Returns the number of mails that went out.
    pub async fn notify_partner(
        &self,
        wms_id: Option<&str>,
        error_text: &str,
        order_label: &str,
    ) -> usize {
        let Some(wms_id) = wms_id else {
            return 0;
        };
        let message =
            extract_error_message(error_text).unwrap_or_else(|| error_text.to_string());

        let mut sent = 0;
        for profile in self.partners.profiles_with_wms_id(wms_id) {
            for address in &profile.notify_addresses {
                match self
                    .mailer
                    .send_order_error(address, &message, order_label)
                    .await
                {
                    Ok(()) => sent += 1,
                    Err(e) => {
                        warn!(address = %address, "Failed to send partner notification: {e}");
                    }
                }
            }
        }
        sent
    }
}

/// The human-readable core of an error: the text after the last colon.
pub fn extract_error_message(text: &str) -> Option<String> {
    text.rfind(':')
        .map(|pos| text[pos + ':'.len_utf8()..].trim().to_string())
}
