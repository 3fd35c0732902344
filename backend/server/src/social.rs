//! # Social login
//!
//! The client finishes the OAuth dance with the provider and hands us the access token.
//! We ask the provider who the token belongs to, then map that identity onto an account:
//!
//! 1. A social account already linked to `(provider, uid)`: sign that user in
//! 2. A user with the same email: link the identity to them
//! 3. Otherwise create a verified user, the provider vouches for the email
use serde::Deserialize;
use tracing::warn;

use crate::{config::Config, error::AppError, models::MAX_USERNAME_LEN};

pub const INVALID_ACCESS_TOKEN: &str = "Invalid access token";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Facebook,
    Google,
}

impl Provider {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "facebook" => Some(Provider::Facebook),
            "google" | "google-oauth2" => Some(Provider::Google),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Facebook => "facebook",
            Provider::Google => "google",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Deserialize)]
struct FacebookProfile {
    id: String,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize)]
struct GoogleTokenInfo {
    sub: String,
    email: Option<String>,
    name: Option<String>,
}

pub struct SocialClient {
    http: reqwest::Client,
    facebook_graph_url: String,
    google_tokeninfo_url: String,
}

impl SocialClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            facebook_graph_url: config.facebook_graph_url.clone(),
            google_tokeninfo_url: config.google_tokeninfo_url.clone(),
        }
    }

    pub async fn identify(&self, provider: Provider, access_token: &str) -> Result<Identity, AppError> {
        let request = match provider {
            Provider::Facebook => self.http.get(&self.facebook_graph_url).query(&[
                ("fields", "id,email,name"),
                ("access_token", access_token),
            ]),
            Provider::Google => self
                .http
                .get(&self.google_tokeninfo_url)
                .query(&[("access_token", access_token)]),
        };

        let response = request.send().await.map_err(|e| {
            warn!("{} identity lookup failed: {e}", provider.as_str());
            AppError::bad_request(INVALID_ACCESS_TOKEN)
        })?;

        if !response.status().is_success() {
            return Err(AppError::bad_request(INVALID_ACCESS_TOKEN));
        }

        let identity = match provider {
            Provider::Facebook => {
                let profile: FacebookProfile = response
                    .json()
                    .await
                    .map_err(|_| AppError::bad_request(INVALID_ACCESS_TOKEN))?;

                Identity {
                    uid: profile.id,
                    email: profile.email,
                    name: profile.name,
                }
            }
            Provider::Google => {
                let info: GoogleTokenInfo = response
                    .json()
                    .await
                    .map_err(|_| AppError::bad_request(INVALID_ACCESS_TOKEN))?;

                Identity {
                    uid: info.sub,
                    email: info.email,
                    name: info.name,
                }
            }
        };

        Ok(identity)
    }
}

/// Username candidate for a fresh social account.
pub fn username_hint(identity: &Identity) -> String {
    let from_name = identity
        .name
        .as_deref()
        .map(|name| {
            name.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_")
                .to_lowercase()
        })
        .filter(|hint| !hint.is_empty());

    let from_email = || {
        identity
            .email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .map(|local| {
                local
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
                    .collect::<String>()
            })
            .filter(|hint| !hint.is_empty())
    };

    from_name
        .or_else(from_email)
        .map(|hint| hint.chars().take(MAX_USERNAME_LEN).collect())
        .unwrap_or_else(|| "author".to_string())
}
