use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::{config::Config, error::AppError};

pub const MAX_SLUG_LEN: usize = 100;
pub const WORDS_PER_MINUTE: usize = 200;

/// Slugs that collide with static routes under `/api/articles`.
pub const RESERVED_SLUGS: [&str; 2] = ["feed", "stats"];

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_\s-]").expect("valid regex"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").expect("valid regex"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));
static USERNAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid regex"));

/// Lowercase ASCII slug. Accents are decomposed (NFKD) and dropped, word
/// characters kept, runs of whitespace and hyphens collapsed into one hyphen.
pub fn slugify(input: &str) -> String {
    let ascii: String = input.nfkd().filter(char::is_ascii).collect();
    let lowered = ascii.to_lowercase();
    let s = NON_WORD.replace_all(&lowered, "");
    let s = SEPARATORS.replace_all(&s, "-");

    let slug: String = s
        .trim_matches(['-', '_'])
        .chars()
        .take(MAX_SLUG_LEN)
        .collect();

    slug.trim_end_matches(['-', '_']).to_string()
}

/// First free slug among `base`, `base-2`, `base-3`, ...
/// Reserved route names never count as free.
pub fn unique_slug(title: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut base = slugify(title);
    if base.is_empty() {
        base = "article".to_string();
    }

    let taken = |candidate: &str| RESERVED_SLUGS.contains(&candidate) || taken(candidate);

    if !taken(&base) {
        return base;
    }

    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}

/// Minutes needed to read `body`, never less than one.
pub fn read_time(body: &str) -> usize {
    let words = body.split_whitespace().count();

    words.div_ceil(WORDS_PER_MINUTE).max(1)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

pub fn is_valid_username(username: &str) -> bool {
    USERNAME.is_match(username)
}

pub fn is_valid_image_url(image: &str) -> bool {
    Url::parse(image)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

pub fn activation_link(config: &Config, token: &str) -> String {
    client_link(config, &config.activate_route, token)
}

pub fn password_reset_link(config: &Config, token: &str) -> String {
    client_link(config, &config.reset_password_route, token)
}

fn client_link(config: &Config, route: &str, token: &str) -> String {
    format!(
        "{}/{}?token={}",
        config.client_domain.trim_end_matches('/'),
        route.trim_matches('/'),
        token
    )
}

/// Hex encoded random bytes.
pub fn random_token(bytes: usize) -> Result<String, AppError> {
    let mut buf = vec![0u8; bytes];
    getrandom::getrandom(&mut buf).map_err(AppError::internal)?;

    Ok(hex::encode(buf))
}
