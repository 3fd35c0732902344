use std::{
    env,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use tracing::{debug, warn};

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub password_iterations: u32,
    pub client_domain: String,
    pub activate_route: String,
    pub reset_password_route: String,
    pub verify_ttl_hours: u64,
    pub reset_ttl_minutes: u64,
    pub data_path: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub sendgrid_key: Option<String>,
    pub email_sender: String,
    pub facebook_graph_url: String,
    pub google_tokeninfo_url: String,
    pub staff_emails: Vec<String>,
}

/// Command line values that win over the environment.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub data_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        Ok(Self {
            port: parsed("RUST_PORT", 8000)?,
            jwt_secret: secret("JWT_SECRET")
                .ok_or_else(|| AppError::Config("missing secret JWT_SECRET".to_string()))?,
            token_ttl_hours: parsed("TOKEN_TTL_HOURS", 24)?,
            password_iterations: parsed("PASSWORD_ITERATIONS", 100_000)?,
            client_domain: text("CLIENT_DOMAIN", "http://localhost:3000"),
            activate_route: text("CLIENT_ACTIVATE_ROUTE", "activate-account"),
            reset_password_route: text("CLIENT_RESET_PASSWORD_ROUTE", "reset-password"),
            verify_ttl_hours: parsed("VERIFY_TTL_HOURS", 72)?,
            reset_ttl_minutes: parsed("RESET_TTL_MINUTES", 60)?,
            data_path: lookup("DATA_PATH").map(PathBuf::from),
            redis_url: lookup("REDIS_URL"),
            sendgrid_key: secret("SENDGRID_API_KEY"),
            email_sender: text("EMAIL_HOST_SENDER", "no-reply@authors.local"),
            facebook_graph_url: text("FACEBOOK_GRAPH_URL", "https://graph.facebook.com/me"),
            google_tokeninfo_url: text(
                "GOOGLE_TOKENINFO_URL",
                "https://www.googleapis.com/oauth2/v3/tokeninfo",
            ),
            staff_emails: lookup("STAFF_EMAILS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
        })
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if overrides.data_path.is_some() {
            self.data_path = overrides.data_path;
        }

        self
    }

    pub fn is_staff_email(&self, email: &str) -> bool {
        self.staff_emails
            .iter()
            .any(|staff| staff.eq_ignore_ascii_case(email))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8000,
            jwt_secret: "development-secret".to_string(),
            token_ttl_hours: 24,
            password_iterations: 1_000,
            client_domain: "http://localhost:3000".to_string(),
            activate_route: "activate-account".to_string(),
            reset_password_route: "reset-password".to_string(),
            verify_ttl_hours: 72,
            reset_ttl_minutes: 60,
            data_path: None,
            redis_url: None,
            sendgrid_key: None,
            email_sender: "no-reply@authors.local".to_string(),
            facebook_graph_url: "https://graph.facebook.com/me".to_string(),
            google_tokeninfo_url: "https://www.googleapis.com/oauth2/v3/tokeninfo".to_string(),
            staff_emails: Vec::new(),
        }
    }
}

const SECRETS_DIR: &str = "/run/secrets";

/// Environment value for `key`. Blank counts as unset.
fn lookup(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn text(key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn parsed<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        debug!("{key} defaults to {default}");
        return Ok(default);
    };

    raw.trim().parse().map_err(|e| {
        warn!("{key}={raw:?} rejected: {e}");
        AppError::Config(format!("invalid value for {key}"))
    })
}

/// Mounted secret file named `name` under `dir`, else the environment.
fn secret_from(dir: &Path, name: &str) -> Option<String> {
    match fs::read_to_string(dir.join(name)) {
        Ok(contents) if !contents.trim().is_empty() => {
            debug!("{name} loaded from {}", dir.display());
            Some(contents.trim().to_string())
        }
        _ => lookup(name),
    }
}

fn secret(name: &str) -> Option<String> {
    secret_from(Path::new(SECRETS_DIR), name)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
