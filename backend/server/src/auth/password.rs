use base64::{Engine, engine::general_purpose::STANDARD};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::error::AppError;

const ALGORITHM: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// `pbkdf2_sha256$<iterations>$<salt>$<hash>`, salt and hash base64.
pub fn hash_password(password: &str, iterations: u32) -> Result<String, AppError> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).map_err(AppError::internal)?;

    let key = derive(password, &salt, iterations);

    Ok(format!(
        "{ALGORITHM}${iterations}${}${}",
        STANDARD.encode(salt),
        STANDARD.encode(key)
    ))
}

pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');

    let (Some(ALGORITHM), Some(iterations), Some(salt), Some(hash), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iterations.parse::<u32>(),
        STANDARD.decode(salt),
        STANDARD.decode(hash),
    ) else {
        return false;
    };

    let actual = derive(password, &salt, iterations);

    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key);

    key
}

#[cfg(test)]
mod tests {
    use super::{hash_password, verify_password};

    #[test]
    fn test_round_trip() {
        let encoded = hash_password("password", 1_000).unwrap();

        assert!(encoded.starts_with("pbkdf2_sha256$1000$"));
        assert!(verify_password("password", &encoded));
        assert!(!verify_password("Password", &encoded));
    }

    #[test]
    fn test_salted() {
        let a = hash_password("password", 1_000).unwrap();
        let b = hash_password("password", 1_000).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash() {
        assert!(!verify_password("password", ""));
        assert!(!verify_password("password", "md5$1$abc$def"));
        assert!(!verify_password("password", "pbkdf2_sha256$x$abc$def"));
        assert!(!verify_password("password", "pbkdf2_sha256$10$%%$def"));
    }
}
