//! # One-time tokens
//!
//! Email verification and password reset links carry an opaque random token.
//!
//! ## Requirements
//!
//! - Single use: consuming a token deletes it
//! - Expiry: verification tokens last days, reset tokens minutes
//! - Survive a server restart when Redis is configured
//!
//! ## Implementation
//!
//! - Key `token:<purpose>:<hex>`, value is the user id
//! - Redis: `SET .. EX ttl` to issue, `GETDEL` to consume atomically
//! - Without `REDIS_URL` the same contract is kept in a process-local map
use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tokio::sync::Mutex;

use crate::{error::AppError, models::Id, utils::random_token};

const TOKEN_BYTES: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Purpose {
    Verify,
    Reset,
}

impl Purpose {
    fn as_str(self) -> &'static str {
        match self {
            Purpose::Verify => "verify",
            Purpose::Reset => "reset",
        }
    }
}

fn key(purpose: Purpose, token: &str) -> String {
    format!("token:{}:{}", purpose.as_str(), token)
}

pub enum TokenStore {
    Memory(Mutex<HashMap<String, (Id, DateTime<Utc>)>>),
    Redis(ConnectionManager),
}

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, AppError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

impl TokenStore {
    pub fn memory() -> Self {
        TokenStore::Memory(Mutex::new(HashMap::new()))
    }

    pub async fn issue(&self, purpose: Purpose, user_id: Id, ttl: Duration) -> Result<String, AppError> {
        let token = random_token(TOKEN_BYTES)?;
        let key = key(purpose, &token);

        match self {
            TokenStore::Memory(map) => {
                let lifetime = chrono::Duration::from_std(ttl).map_err(AppError::internal)?;
                map.lock().await.insert(key, (user_id, Utc::now() + lifetime));
            }
            TokenStore::Redis(manager) => {
                let mut connection = manager.clone();
                let _: () = connection.set_ex(key, user_id, ttl.as_secs().max(1)).await?;
            }
        }

        Ok(token)
    }

    /// Returns the owner of a live token and burns it.
    pub async fn consume(&self, purpose: Purpose, token: &str) -> Result<Option<Id>, AppError> {
        let key = key(purpose, token);

        match self {
            TokenStore::Memory(map) => {
                let mut map = map.lock().await;
                map.retain(|_, (_, expires)| *expires > Utc::now());

                Ok(map.remove(&key).map(|(user_id, _)| user_id))
            }
            TokenStore::Redis(manager) => {
                let mut connection = manager.clone();
                let user_id: Option<Id> = connection.get_del(key).await?;

                Ok(user_id)
            }
        }
    }
}
