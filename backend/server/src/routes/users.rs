use std::{sync::Arc, time::Duration};

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Payload;
use crate::{
    auth::{
        CurrentUser, issue_token,
        password::{hash_password, verify_password},
    },
    database::{NewUser, Tables},
    error::{AppError, FieldErrors},
    mail::{password_reset_email, verification_email},
    models::{Id, MAX_USERNAME_LEN, User},
    render::JSend,
    social::{Provider, username_hint},
    state::AppState,
    tokens::Purpose,
    utils::{is_valid_email, is_valid_image_url, is_valid_username},
};

pub const BAD_LOGIN: &str = "A user with this email and password was not found.";
pub const BAD_VERIFY_TOKEN: &str = "Invalid or expired verification token.";
pub const BAD_RESET_TOKEN: &str = "Invalid or expired password reset token.";
pub const RESET_SENT: &str =
    "If an account with that email exists, a password reset link has been sent.";

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

#[derive(Deserialize, Default)]
pub struct UserPayload<T> {
    #[serde(default)]
    pub user: T,
}

#[derive(Deserialize, Default)]
pub struct Registration {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct Login {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
}

#[derive(Deserialize)]
pub struct TokenPayload {
    pub token: String,
}

#[derive(Deserialize)]
pub struct ForgotPassword {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPassword {
    pub token: String,
    pub password: String,
}

#[derive(Deserialize, Default)]
pub struct SocialLogin {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub access_token: String,
}

#[derive(Deserialize)]
pub struct Subscription {
    pub subscribed: bool,
}

#[derive(Serialize)]
pub struct UserView {
    pub username: String,
    pub email: String,
    pub bio: String,
    pub image: Option<String>,
    pub is_verified: bool,
    pub is_subscribed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl UserView {
    pub fn new(user: &User, token: Option<String>) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone(),
            bio: user.bio.clone(),
            image: user.image.clone(),
            is_verified: user.is_verified,
            is_subscribed: user.is_subscribed,
            token,
        }
    }
}

fn required(errors: &mut FieldErrors, field: &str, value: Option<String>, message: &str) -> String {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.is_empty() {
        errors.add(field, message);
    }

    value
}

fn check_username(errors: &mut FieldErrors, tables: &Tables, username: &str, owner: Option<Id>) {
    if username.is_empty() {
        return;
    }

    if username.len() > MAX_USERNAME_LEN {
        errors.add("username", "Username cannot be more than 64 characters");
    } else if !is_valid_username(username) {
        errors.add(
            "username",
            "Username can only contain letters, numbers, dots, dashes and underscores",
        );
    } else if tables
        .user_by_username(username)
        .is_some_and(|user| Some(user.id) != owner)
    {
        errors.add("username", "user with this username already exists.");
    }
}

fn check_email(errors: &mut FieldErrors, tables: &Tables, email: &str, owner: Option<Id>) {
    if email.is_empty() {
        return;
    }

    if !is_valid_email(email) {
        errors.add("email", "Enter a valid email address.");
    } else if tables
        .user_by_email(email)
        .is_some_and(|user| Some(user.id) != owner)
    {
        errors.add("email", "user with this email already exists.");
    }
}

fn check_password(errors: &mut FieldErrors, password: &str) {
    if password.is_empty() {
        return;
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add("password", "Password must be at least 8 characters long");
    } else if password.chars().count() > MAX_PASSWORD_LEN {
        errors.add("password", "Password cannot be more than 128 characters");
    } else if password.chars().all(|c| c.is_ascii_digit()) {
        errors.add("password", "Password cannot be entirely numeric");
    }
}

async fn send_verification(state: &AppState, user: &User) -> Result<(), AppError> {
    let ttl = Duration::from_secs(state.config.verify_ttl_hours * 60 * 60);
    let token = state.tokens.issue(Purpose::Verify, user.id, ttl).await?;

    state
        .mailer
        .send(verification_email(&state.config, user, &token));

    Ok(())
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<UserPayload<Registration>>,
) -> Result<impl IntoResponse, AppError> {
    let input = payload.user;
    let mut errors = FieldErrors::new();

    let username = required(&mut errors, "username", input.username, "A username is required");
    let email = required(&mut errors, "email", input.email, "An email is required");
    let password = input.password.unwrap_or_default();
    if password.is_empty() {
        errors.add("password", "A password is required");
    }
    check_password(&mut errors, &password);

    let hashed = if errors.get("password").is_none() {
        Some(hash_password(&password, state.config.password_iterations)?)
    } else {
        None
    };

    let user = {
        let mut db = state.db.write().await;
        check_username(&mut errors, &db, &username, None);
        check_email(&mut errors, &db, &email, None);
        errors.into_result()?;

        let user = db
            .insert_user(NewUser {
                is_staff: state.config.is_staff_email(&email),
                username,
                email,
                password: hashed,
                is_verified: false,
            })
            .clone();
        db.commit().await?;

        user
    };

    info!("Registered user {} ({})", user.username, user.id);

    send_verification(&state, &user).await?;
    let token = issue_token(&state.config, &user)?;

    Ok((
        StatusCode::CREATED,
        JSend::named("user", UserView::new(&user, Some(token))),
    ))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<UserPayload<Login>>,
) -> Result<impl IntoResponse, AppError> {
    let input = payload.user;
    let mut errors = FieldErrors::new();

    let email = required(&mut errors, "email", input.email, "An email address is required to log in.");
    let password = input.password.unwrap_or_default();
    if password.is_empty() {
        errors.add("password", "A password is required to log in.");
    }
    errors.into_result()?;

    let user = state
        .db
        .read()
        .await
        .user_by_email(&email)
        .cloned()
        .ok_or_else(|| AppError::bad_request(BAD_LOGIN))?;

    let matches = user
        .password
        .as_deref()
        .is_some_and(|hash| verify_password(&password, hash));
    if !matches {
        return Err(AppError::bad_request(BAD_LOGIN));
    }

    let token = issue_token(&state.config, &user)?;

    Ok(JSend::named("user", UserView::new(&user, Some(token))))
}

pub async fn current_user_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let token = issue_token(&state.config, &user)?;

    Ok(JSend::named("user", UserView::new(&user, Some(token))))
}

pub async fn update_user_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Payload(payload): Payload<UserPayload<UserUpdate>>,
) -> Result<impl IntoResponse, AppError> {
    let input = payload.user;
    let mut errors = FieldErrors::new();

    let username = input.username.map(|u| u.trim().to_string());
    let email = input.email.map(|e| e.trim().to_string());

    if username.as_deref() == Some("") {
        errors.add("username", "A username is required");
    }
    if email.as_deref() == Some("") {
        errors.add("email", "An email is required");
    }
    match input.password.as_deref() {
        Some("") => errors.add("password", "A password is required"),
        Some(password) => check_password(&mut errors, password),
        None => {}
    }
    if let Some(image) = input.image.as_deref().filter(|i| !i.is_empty()) {
        if !is_valid_image_url(image) {
            errors.add("image", "Enter a valid URL.");
        }
    }

    let hashed = match input.password.as_deref() {
        Some(password) if errors.get("password").is_none() => {
            Some(hash_password(password, state.config.password_iterations)?)
        }
        _ => None,
    };

    let updated = {
        let mut db = state.db.write().await;
        if let Some(username) = &username {
            check_username(&mut errors, &db, username, Some(user.id));
        }
        if let Some(email) = &email {
            check_email(&mut errors, &db, email, Some(user.id));
        }
        errors.into_result()?;

        let row = db.user_mut(user.id)?;
        if let Some(username) = username {
            row.username = username;
        }
        if let Some(email) = email {
            row.email = email;
        }
        if hashed.is_some() {
            row.password = hashed;
        }
        if let Some(bio) = input.bio {
            row.bio = bio;
        }
        if let Some(image) = input.image {
            row.image = Some(image).filter(|i| !i.is_empty());
        }
        row.updated_at = Utc::now();

        let updated = row.clone();
        db.commit().await?;

        updated
    };

    let token = issue_token(&state.config, &updated)?;

    Ok(JSend::named("user", UserView::new(&updated, Some(token))))
}

pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<TokenPayload>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = state
        .tokens
        .consume(Purpose::Verify, payload.token.trim())
        .await?
        .ok_or_else(|| AppError::bad_request(BAD_VERIFY_TOKEN))?;

    let mut db = state.db.write().await;
    let user = db
        .user_mut(user_id)
        .map_err(|_| AppError::bad_request(BAD_VERIFY_TOKEN))?;
    user.is_verified = true;
    user.updated_at = Utc::now();

    info!("Verified user {}", user.username);
    db.commit().await?;

    Ok(JSend::message("Your account has been verified."))
}

pub async fn resend_verification_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    if user.is_verified {
        return Err(AppError::bad_request("Your account is already verified."));
    }

    send_verification(&state, &user).await?;

    Ok(JSend::message(format!(
        "A verification link has been sent to {}.",
        user.email
    )))
}

pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<ForgotPassword>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .db
        .read()
        .await
        .user_by_email(payload.email.trim())
        .cloned();

    if let Some(user) = user {
        let ttl = Duration::from_secs(state.config.reset_ttl_minutes * 60);
        let token = state.tokens.issue(Purpose::Reset, user.id, ttl).await?;

        state
            .mailer
            .send(password_reset_email(&state.config, &user, &token));
    }

    Ok(JSend::message(RESET_SENT))
}

pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<ResetPassword>,
) -> Result<impl IntoResponse, AppError> {
    let mut errors = FieldErrors::new();
    if payload.password.is_empty() {
        errors.add("password", "A password is required");
    }
    check_password(&mut errors, &payload.password);
    errors.into_result()?;

    let hashed = hash_password(&payload.password, state.config.password_iterations)?;

    let user_id = state
        .tokens
        .consume(Purpose::Reset, payload.token.trim())
        .await?
        .ok_or_else(|| AppError::bad_request(BAD_RESET_TOKEN))?;

    let mut db = state.db.write().await;
    let user = db
        .user_mut(user_id)
        .map_err(|_| AppError::bad_request(BAD_RESET_TOKEN))?;
    user.password = Some(hashed);
    user.updated_at = Utc::now();

    info!("Password reset for {}", user.username);
    db.commit().await?;

    Ok(JSend::message("Your password has been reset."))
}

pub async fn social_login_handler(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<SocialLogin>,
) -> Result<impl IntoResponse, AppError> {
    let mut errors = FieldErrors::new();
    if payload.provider.trim().is_empty() {
        errors.add("provider", "A provider is required");
    }
    if payload.access_token.trim().is_empty() {
        errors.add("access_token", "An access token is required");
    }
    errors.into_result()?;

    let provider = Provider::parse(&payload.provider)
        .ok_or_else(|| AppError::bad_request("Provider not supported"))?;

    let identity = state
        .social
        .identify(provider, payload.access_token.trim())
        .await?;

    let user = {
        let mut db = state.db.write().await;

        let existing = match db.social_user(provider.as_str(), &identity.uid) {
            Some(id) => db.user(id).cloned(),
            None => identity
                .email
                .as_deref()
                .and_then(|email| db.user_by_email(email))
                .cloned(),
        };

        let user = match existing {
            Some(user) => user,
            None => {
                let email = identity.email.clone().ok_or_else(|| {
                    AppError::bad_request("The provider did not share an email address")
                })?;
                let username = db.free_username(&username_hint(&identity));

                info!("Creating {} account {username}", provider.as_str());

                db.insert_user(NewUser {
                    is_staff: state.config.is_staff_email(&email),
                    username,
                    email,
                    password: None,
                    is_verified: true,
                })
                .clone()
            }
        };

        db.link_social(provider.as_str(), &identity.uid, user.id);
        db.commit().await?;

        user
    };

    let token = issue_token(&state.config, &user)?;

    Ok(JSend::named("user", UserView::new(&user, Some(token))))
}

pub async fn subscription_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Payload(payload): Payload<Subscription>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    db.user_mut(user.id)?.is_subscribed = payload.subscribed;
    db.commit().await?;

    let message = if payload.subscribed {
        "You will receive email notifications."
    } else {
        "You have unsubscribed from email notifications."
    };

    Ok(JSend::message(message))
}
