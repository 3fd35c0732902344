use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{error::AppError, models::Id};

type HmacSha256 = Hmac<Sha256>;

/// `{"alg":"HS256","typ":"JWT"}`
const HEADER: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9";

pub const INVALID_TOKEN: &str = "Invalid authentication. Could not decode token.";
pub const EXPIRED_TOKEN: &str = "Token has expired. Please log in again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: Id,
    pub username: String,
    pub exp: i64,
}

impl Claims {
    pub fn new(id: Id, username: &str, ttl_hours: i64) -> Self {
        Self {
            id,
            username: username.to_string(),
            exp: (Utc::now() + Duration::hours(ttl_hours)).timestamp(),
        }
    }
}

fn mac(secret: &str) -> Result<HmacSha256, AppError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Config("unusable JWT secret".to_string()))
}

pub fn encode(claims: &Claims, secret: &str) -> Result<String, AppError> {
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{HEADER}.{payload}");

    let mut mac = mac(secret)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

pub fn decode(token: &str, secret: &str) -> Result<Claims, AppError> {
    let invalid = || AppError::forbidden(INVALID_TOKEN);

    let (signing_input, signature) = token.rsplit_once('.').ok_or_else(invalid)?;
    let (header, payload) = signing_input.split_once('.').ok_or_else(invalid)?;
    if header != HEADER {
        return Err(invalid());
    }

    let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;
    let mut mac = mac(secret)?;
    mac.update(signing_input.as_bytes());
    mac.verify_slice(&signature).map_err(|_| invalid())?;

    let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| invalid())?;

    if claims.exp <= Utc::now().timestamp() {
        return Err(AppError::forbidden(EXPIRED_TOKEN));
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::{Claims, HEADER, decode, encode};
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

    #[test]
    fn test_header_constant() {
        assert_eq!(
            URL_SAFE_NO_PAD.decode(HEADER).unwrap(),
            br#"{"alg":"HS256","typ":"JWT"}"#
        );
    }

    #[test]
    fn test_round_trip() {
        let claims = Claims::new(3, "bev", 1);
        let token = encode(&claims, "secret").unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert_eq!(decode(&token, "secret").unwrap(), claims);
    }

    #[test]
    fn test_wrong_secret() {
        let token = encode(&Claims::new(3, "bev", 1), "secret").unwrap();

        assert!(decode(&token, "other").is_err());
    }

    #[test]
    fn test_tampered_payload() {
        let token = encode(&Claims::new(3, "bev", 1), "secret").unwrap();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"id":1,"username":"admin","exp":9999999999}"#);

        let parts: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);

        assert!(decode(&tampered, "secret").is_err());
    }

    #[test]
    fn test_expired() {
        let token = encode(&Claims::new(3, "bev", -1), "secret").unwrap();

        assert!(decode(&token, "secret").is_err());
    }

    #[test]
    fn test_garbage() {
        assert!(decode("not-a-token", "secret").is_err());
        assert!(decode("a.b.c", "secret").is_err());
    }
}
