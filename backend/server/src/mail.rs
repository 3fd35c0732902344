//! # Mail
//!
//! Handlers never talk to the mail provider directly. They push an [`Email`] on an
//! unbounded channel and a single background worker delivers it.
//!
//! - No SendGrid key: the worker only logs what it would have sent
//! - SendGrid key: v3 `mail/send` over HTTPS
//! - A failed delivery is logged and dropped, the request that queued it already returned
use serde_json::json;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{info, warn};

use crate::{
    config::Config,
    error::AppError,
    models::User,
    utils::{activation_link, password_reset_link},
};

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone)]
pub struct Mailer {
    sender: UnboundedSender<Email>,
}

impl Mailer {
    pub fn channel() -> (Self, UnboundedReceiver<Email>) {
        let (sender, outbox) = unbounded_channel();

        (Self { sender }, outbox)
    }

    pub fn send(&self, email: Email) {
        if self.sender.send(email).is_err() {
            warn!("Mail worker is gone, dropping email");
        }
    }
}

pub enum Transport {
    Log,
    SendGrid {
        client: reqwest::Client,
        api_key: String,
        sender: String,
    },
}

impl Transport {
    pub fn from_config(config: &Config) -> Self {
        match &config.sendgrid_key {
            Some(api_key) => Transport::SendGrid {
                client: reqwest::Client::new(),
                api_key: api_key.clone(),
                sender: config.email_sender.clone(),
            },
            None => {
                info!("SENDGRID_API_KEY not set, emails will only be logged");
                Transport::Log
            }
        }
    }

    async fn deliver(&self, email: &Email) -> Result<(), AppError> {
        match self {
            Transport::Log => {
                info!("Email to {}: {}", email.to, email.subject);

                #[cfg(feature = "verbose")]
                info!("{}", email.body);

                Ok(())
            }
            Transport::SendGrid {
                client,
                api_key,
                sender,
            } => {
                let payload = json!({
                    "personalizations": [{ "to": [{ "email": email.to }] }],
                    "from": { "email": sender },
                    "subject": email.subject,
                    "content": [{ "type": "text/plain", "value": email.body }],
                });

                client
                    .post(SENDGRID_ENDPOINT)
                    .bearer_auth(api_key)
                    .json(&payload)
                    .send()
                    .await?
                    .error_for_status()?;

                Ok(())
            }
        }
    }
}

pub async fn run_mailer(mut outbox: UnboundedReceiver<Email>, transport: Transport) {
    while let Some(email) = outbox.recv().await {
        if let Err(e) = transport.deliver(&email).await {
            warn!("Failed to deliver email to {}: {e}", email.to);
        }
    }

    info!("Mail worker stopped");
}

pub fn verification_email(config: &Config, user: &User, token: &str) -> Email {
    Email {
        to: user.email.clone(),
        subject: "Verify your Authors account".to_string(),
        body: format!(
            "Hi {},\n\nConfirm your email address to start publishing:\n{}\n",
            user.username,
            activation_link(config, token)
        ),
    }
}

pub fn password_reset_email(config: &Config, user: &User, token: &str) -> Email {
    Email {
        to: user.email.clone(),
        subject: "Reset your Authors password".to_string(),
        body: format!(
            "Hi {},\n\nUse the link below to choose a new password. It expires in {} minutes.\n{}\n",
            user.username,
            config.reset_ttl_minutes,
            password_reset_link(config, token)
        ),
    }
}

pub fn new_article_email(follower: &User, author: &str, title: &str) -> Email {
    Email {
        to: follower.email.clone(),
        subject: "You have a new notification".to_string(),
        body: format!(
            "Hi {},\n\n{author} just published \"{title}\".\n",
            follower.username
        ),
    }
}

/// The token carried by a link inside an email body.
pub fn token_from_body(body: &str) -> Option<&str> {
    let start = body.find("token=")? + "token=".len();

    body[start..].split_whitespace().next()
}
