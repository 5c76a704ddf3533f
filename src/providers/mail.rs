//! Mail collaborator: sends APRS position-report mails over SMTP and
//! prunes the account's "Sent" folder on a schedule. The retention for
//! the destructive prune is mandatory in the configuration; an empty
//! account disables the whole feature.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use crate::config::MailConfig;

use super::{ProviderError, ProviderResult};

const SENT_FOLDER: &str = "Sent";

#[derive(Clone)]
pub struct MailAccount {
    config: MailConfig,
    enabled: bool,
}

impl MailAccount {
    pub fn new(config: MailConfig, enabled: bool) -> Self {
        Self { config, enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Mail a short position report for `callsign` to `recipient`. The
    /// body carries the resolved address plus the live tracking link.
    pub async fn send_position_report(
        &self,
        recipient: &str,
        callsign: &str,
        address_text: &str,
        lat: f64,
        lon: f64,
    ) -> ProviderResult<()> {
        if !self.enabled {
            return Err(ProviderError::Disabled);
        }

        let body = format!(
            "Position report for {}\n\n{}\nLat/Lon: {}/{}\n\nLive map: https://aprs.fi/{}\n\n73 de {}\n",
            callsign,
            address_text,
            lat,
            lon,
            callsign.to_lowercase(),
            crate::AGENT_NAME
        );
        let message = Message::builder()
            .from(
                self.config
                    .account
                    .parse()
                    .map_err(|e| ProviderError::Internal(format!("bad mail account: {}", e)))?,
            )
            .to(recipient
                .parse()
                .map_err(|_| ProviderError::NotFound)?)
            .subject(format!("APRS position report for {}", callsign))
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| ProviderError::Internal(format!("cannot build mail: {}", e)))?;

        let transport: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_server)
                .map_err(|e| ProviderError::Unavailable(e.to_string()))?
                .credentials(Credentials::new(
                    self.config.account.clone(),
                    self.config.password.clone(),
                ))
                .build();

        transport
            .send(message)
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        info!("Position report for {} mailed to {}", callsign, recipient);
        Ok(())
    }

    /// Delete everything in the "Sent" folder older than the configured
    /// retention. IMAP is synchronous, so the session runs on a blocking
    /// worker thread.
    pub async fn prune_sent_folder(&self) -> Result<usize> {
        if !self.enabled {
            return Ok(0);
        }
        let retention_days = self
            .config
            .sent_retention_days
            .context("sent_retention_days missing despite enabled mail")?;
        let account = self.config.account.clone();
        let password = self.config.password.clone();
        let server = self.config.imap_server.clone();

        let deleted = tokio::task::spawn_blocking(move || -> Result<usize> {
            let tls = native_tls::TlsConnector::builder().build()?;
            let client = imap::connect((server.as_str(), 993), server.as_str(), &tls)
                .context("cannot connect to IMAP server")?;
            let mut session = client
                .login(&account, &password)
                .map_err(|(e, _)| anyhow::anyhow!("IMAP login failed: {}", e))?;

            session.select(SENT_FOLDER)?;
            let cutoff = (Utc::now() - Duration::days(retention_days as i64))
                .format("%d-%b-%Y")
                .to_string();
            let old = session.search(format!("BEFORE {}", cutoff))?;
            let count = old.len();
            if count > 0 {
                let sequence = old
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                session.store(&sequence, "+FLAGS (\\Deleted)")?;
                session.expunge()?;
            }
            session.logout().ok();
            Ok(count)
        })
        .await
        .context("prune task panicked")??;

        if deleted > 0 {
            info!("Pruned {} mails from the Sent folder", deleted);
        } else {
            debug!("Sent folder prune: nothing to delete");
        }
        Ok(deleted)
    }
}
