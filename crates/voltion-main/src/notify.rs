// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of VoltION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info};
use voltion_core::Notifier;
use voltion_types::ModeChangeEvent;

use crate::config::EmailSettings;

/// Emails mode changes and auth failures to the configured admins
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    admin_recipients: Vec<String>,
}

impl EmailNotifier {
    pub fn new(config: &EmailSettings) -> Result<Self> {
        let from: Mailbox = config
            .from_address
            .parse()
            .with_context(|| format!("Invalid from_address: {}", config.from_address))?;

        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let transport = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .with_context(|| format!("Failed to create SMTP relay: {}", config.smtp_host))?
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            transport,
            from,
            admin_recipients: config.admin_recipients.clone(),
        })
    }

    async fn send_to_all(&self, subject: &str, body: &str) -> Result<()> {
        for recipient in &self.admin_recipients {
            let to: Mailbox = match recipient.parse() {
                Ok(m) => m,
                Err(e) => {
                    error!(recipient = %recipient, error = %e, "Invalid recipient address, skipping");
                    continue;
                }
            };

            let message = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(subject)
                .body(body.to_owned())
                .context("Failed to build email message")?;

            match self.transport.send(message).await {
                Ok(_) => info!(recipient = %recipient, subject = %subject, "Email sent"),
                Err(e) => error!(recipient = %recipient, error = %e, "Failed to send email"),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify_mode_change(&self, event: &ModeChangeEvent) -> Result<()> {
        let subject = format!(
            "VoltION: mode changed to {}",
            event.new_mode.display_name()
        );
        let body = format!(
            "The battery operating mode was changed.\n\n\
             {event}\n\n\
             Time: {}",
            event.occurred_at.to_rfc3339()
        );
        self.send_to_all(&subject, &body).await
    }

    async fn notify_auth_failure(&self, detail: &str) -> Result<()> {
        let subject = "VoltION Alert: device authentication failing".to_string();
        let body = format!(
            "The device API rejected our credentials and the control loop cannot\n\
             proceed until the access token is renewed.\n\n\
             Detail: {detail}"
        );
        self.send_to_all(&subject, &body).await
    }

    fn name(&self) -> &str {
        "email"
    }
}

/// Fallback notifier used when SMTP is not configured
#[derive(Debug, Default)]
pub struct LogOnlyNotifier;

#[async_trait]
impl Notifier for LogOnlyNotifier {
    async fn notify_mode_change(&self, event: &ModeChangeEvent) -> Result<()> {
        info!("Mode change (email disabled): {}", event);
        Ok(())
    }

    async fn notify_auth_failure(&self, detail: &str) -> Result<()> {
        error!("Authentication failure (email disabled): {}", detail);
        Ok(())
    }

    fn name(&self) -> &str {
        "log-only"
    }
}
