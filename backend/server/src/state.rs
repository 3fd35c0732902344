use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use super::{
    config::Config,
    database::Database,
    error::AppError,
    mail::{Email, Mailer, Transport, run_mailer},
    social::SocialClient,
    tokens::{TokenStore, init_redis},
};

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub tokens: TokenStore,
    pub mailer: Mailer,
    pub social: SocialClient,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, AppError> {
        let db = match &config.data_path {
            Some(path) => Database::open(path).await?,
            None => {
                info!("DATA_PATH not set, data lives in memory only");
                Database::in_memory()
            }
        };

        let tokens = match &config.redis_url {
            Some(url) => TokenStore::Redis(init_redis(url).await?),
            None => TokenStore::memory(),
        };

        let (mailer, outbox) = Mailer::channel();
        tokio::spawn(run_mailer(outbox, Transport::from_config(&config)));

        Ok(Self::from_parts(config, db, tokens, mailer))
    }

    /// In-memory state whose outgoing mail stays in the returned receiver.
    pub fn detached(config: Config) -> (Arc<Self>, UnboundedReceiver<Email>) {
        let (mailer, outbox) = Mailer::channel();
        let state = Self::from_parts(config, Database::in_memory(), TokenStore::memory(), mailer);

        (state, outbox)
    }

    pub fn from_parts(config: Config, db: Database, tokens: TokenStore, mailer: Mailer) -> Arc<Self> {
        let social = SocialClient::new(&config);

        Arc::new(Self {
            config,
            db,
            tokens,
            mailer,
            social,
        })
    }
}
