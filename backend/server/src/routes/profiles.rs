use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Path, Payload};
use crate::{
    auth::CurrentUser,
    database::Tables,
    error::{AppError, FieldErrors},
    models::{Id, User},
    render::JSend,
    state::AppState,
    utils::is_valid_image_url,
};

#[derive(Serialize, Clone)]
pub struct ProfileView {
    pub username: String,
    pub bio: String,
    pub image: Option<String>,
    pub following: bool,
}

impl ProfileView {
    pub fn new(user: &User, viewer: Option<&User>) -> Self {
        Self {
            username: user.username.clone(),
            bio: user.bio.clone(),
            image: user.image.clone(),
            following: viewer.is_some_and(|v| v.following.contains(&user.id)),
        }
    }

    /// Profile of `id` as seen by `viewer`; deleted accounts render as empty.
    pub fn of(tables: &Tables, id: Id, viewer: Option<Id>) -> Self {
        let viewer = viewer.and_then(|v| tables.user(v));

        match tables.user(id) {
            Some(user) => Self::new(user, viewer),
            None => Self {
                username: String::new(),
                bio: String::new(),
                image: None,
                following: false,
            },
        }
    }
}

#[derive(Deserialize, Default)]
pub struct ProfileUpdate {
    pub bio: Option<String>,
    pub image: Option<String>,
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let db = state.db.read().await;

    let profiles: Vec<ProfileView> = db
        .users
        .values()
        .filter(|user| user.id != me.id)
        .map(|user| ProfileView::new(user, Some(&me)))
        .collect();

    Ok(JSend::named("profiles", profiles))
}

pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = state.db.read().await;
    let user = db.profile(&username)?;

    Ok(JSend::named("profile", ProfileView::new(user, Some(&me))))
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(username): Path<String>,
    Payload(input): Payload<ProfileUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let target = db.profile(&username)?.id;

    if target != me.id {
        return Err(AppError::forbidden("You can only update your own profile."));
    }

    let mut errors = FieldErrors::new();
    if let Some(image) = input.image.as_deref().filter(|i| !i.is_empty()) {
        if !is_valid_image_url(image) {
            errors.add("image", "Enter a valid URL.");
        }
    }
    errors.into_result()?;

    let user = db.user_mut(target)?;
    if let Some(bio) = input.bio {
        user.bio = bio;
    }
    if let Some(image) = input.image {
        user.image = Some(image).filter(|i| !i.is_empty());
    }
    user.updated_at = Utc::now();

    let view = ProfileView::new(user, None);
    db.commit().await?;

    Ok(JSend::named("profile", view))
}

pub async fn follow_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let target = db.profile(&username)?.id;

    if target == me.id {
        return Err(AppError::bad_request("You cannot follow yourself."));
    }

    if !db.user_mut(me.id)?.following.insert(target) {
        return Err(AppError::bad_request(format!(
            "You are already following {username}."
        )));
    }

    db.commit().await?;
    info!("{} now follows {username}", me.username);

    Ok(JSend::named("profile", ProfileView::of(&db, target, Some(me.id))))
}

pub async fn unfollow_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let target = db.profile(&username)?.id;

    if !db.user_mut(me.id)?.following.remove(&target) {
        return Err(AppError::bad_request(format!(
            "You are not following {username}."
        )));
    }
    db.commit().await?;

    Ok(JSend::named("profile", ProfileView::of(&db, target, Some(me.id))))
}

pub async fn followers_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = state.db.read().await;
    let target = db.profile(&username)?.id;

    let followers: Vec<ProfileView> = db
        .followers_of(target)
        .into_iter()
        .map(|user| ProfileView::of(&db, user.id, Some(me.id)))
        .collect();

    Ok(JSend::named("followers", followers))
}

pub async fn following_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = state.db.read().await;
    let target = db.profile(&username)?;

    let following: Vec<ProfileView> = target
        .following
        .iter()
        .map(|&id| ProfileView::of(&db, id, Some(me.id)))
        .collect();

    Ok(JSend::named("following", following))
}
