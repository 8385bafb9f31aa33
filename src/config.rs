//! Intake configuration, built from environment variables.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Runtime configuration for one sweep.
///
/// Mailbox credentials are required; every service endpoint falls back to a
/// sensible local default so the pipeline can run against a staging stack
/// without a full environment.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: String,

    pub wms_base_url: String,
    pub wms_token: String,
    pub files_base_url: String,

    pub telegram_bot_token: Option<String>,
    pub telegram_alert_chat: String,

    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_from: String,

    pub storage_root: PathBuf,
    pub db_path: PathBuf,
}

impl IntakeConfig {
    /// Build config from environment variables.
    ///
    /// Fails only on missing mailbox credentials; malformed optional values
    /// fall back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_host = require("MAIL_HOST")?;
        let username = require("MAIL_USERNAME")?;
        let password = require("MAIL_PASSWORD")?;

        let imap_port: u16 = std::env::var("MAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let wms_base_url = std::env::var("WMS_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8000/api".to_string());
        let wms_token = std::env::var("WMS_API_TOKEN").unwrap_or_default();
        let files_base_url =
            std::env::var("FILES_BASE_URL").unwrap_or_else(|_| wms_base_url.clone());

        let telegram_bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok();
        let telegram_alert_chat = std::env::var("TELEGRAM_ALERT_CHAT").unwrap_or_default();

        let smtp_host =
            std::env::var("SMTP_HOST").unwrap_or_else(|_| imap_host.replace("imap", "smtp"));
        let smtp_port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);
        let smtp_username = std::env::var("SMTP_USERNAME").unwrap_or_else(|_| username.clone());
        let smtp_password = std::env::var("SMTP_PASSWORD").unwrap_or_else(|_| password.clone());
        let smtp_from = std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone());

        let storage_root = std::env::var("INTAKE_STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./storage"));
        let db_path = std::env::var("INTAKE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/mail-intake.db"));

        Ok(Self {
            imap_host,
            imap_port,
            username,
            password,
            wms_base_url,
            wms_token,
            files_base_url,
            telegram_bot_token,
            telegram_alert_chat,
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            smtp_from,
            storage_root,
            db_path,
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_fails_without_mailbox_host() {
        // SAFETY: config tests are the only readers of MAIL_HOST.
        unsafe { std::env::remove_var("MAIL_HOST") };
        assert!(matches!(
            IntakeConfig::from_env(),
            Err(ConfigError::MissingEnvVar(key)) if key == "MAIL_HOST"
        ));
    }
}
