use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use mail_intake::archive::MessageArchive;
use mail_intake::config::IntakeConfig;
use mail_intake::ledger::ProcessingLedger;
use mail_intake::mailbox::MailboxSession;
use mail_intake::mailbox::imap::ImapMailbox;
use mail_intake::notify::{
    AlertSink, ErrorNotifier, LogAlerts, PartnerMailer, SmtpPartnerMailer, TelegramAlerts,
};
use mail_intake::orders::{FileService, FilesClient, OrderService, OrderSubmitter, WmsClient};
use mail_intake::partners::PartnerDirectory;
use mail_intake::sweep::Sweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = IntakeConfig::from_env()?;

    let ledger = Arc::new(ProcessingLedger::open(&config.db_path).await?);
    let partners = Arc::new(PartnerDirectory::builtin());
    let orders: Arc<dyn OrderService> =
        Arc::new(WmsClient::new(&config.wms_base_url, &config.wms_token));
    let files: Arc<dyn FileService> =
        Arc::new(FilesClient::new(&config.files_base_url, &config.wms_token));

    let alerts: Arc<dyn AlertSink> = match config.telegram_bot_token.as_deref() {
        Some(token) => Arc::new(TelegramAlerts::new(token, &config.telegram_alert_chat)),
        None => Arc::new(LogAlerts),
    };
    let mailer: Arc<dyn PartnerMailer> = Arc::new(SmtpPartnerMailer::new(
        &config.smtp_host,
        config.smtp_port,
        &config.smtp_username,
        &config.smtp_password,
        &config.smtp_from,
    ));
    let notifier = ErrorNotifier::new(Arc::clone(&alerts), mailer, Arc::clone(&partners));

    let submitter = OrderSubmitter::new(
        Arc::clone(&orders),
        Arc::clone(&files),
        Arc::clone(&ledger),
    );
    let sweep = Sweep::new(
        ledger,
        partners,
        submitter,
        files,
        notifier,
        MessageArchive::new(&config.storage_root),
    );

    let mut session = match ImapMailbox::connect(&config).await {
        Ok(session) => session,
        Err(e) => {
            error!("Cannot open mailbox: {e}");
            alerts
                .send_alert("mail_error", &format!("Письмо #0: {e}"))
                .await
                .ok();
            return Err(e.into());
        }
    };

    let result = sweep.run(&mut session).await;
    session.logout().await.ok();

    match result {
        Ok(stats) => info!(?stats, "Intake run complete"),
        Err(e) => {
            error!("Sweep aborted: {e}");
            alerts
                .send_alert("mail_error", &format!("Письмо #0: {e}"))
                .await
                .ok();
        }
    }

    MessageArchive::new(&config.storage_root).prune_old(Utc::now().date_naive())?;
    Ok(())
}
