use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{Path, Payload, articles::ReactionsView};
use crate::{
    auth::CurrentUser,
    error::AppError,
    fanout::notify_author,
    models::{Reaction, User, Verb},
    render::JSend,
    state::AppState,
};

pub const BAD_RATING: &str = "Rating should be a number between 1 and 5!";
pub const OWN_RATING: &str = "You cannot rate your own article.";

#[derive(Deserialize, Default)]
pub struct RatingPayload {
    #[serde(default)]
    pub rating: RatingInput,
}

#[derive(Deserialize, Default)]
pub struct RatingInput {
    /// Loose so strings and floats get the range message too.
    pub rating: Option<Value>,
}

#[derive(Serialize)]
pub struct RatingView {
    pub article: String,
    pub rating: u8,
    pub avg_rating: f64,
}

fn parse_rating(value: Option<&Value>) -> Result<u8, AppError> {
    value
        .and_then(Value::as_u64)
        .filter(|rating| (1..=5).contains(rating))
        .and_then(|rating| u8::try_from(rating).ok())
        .ok_or_else(|| AppError::bad_request(BAD_RATING))
}

pub async fn favorite_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let article = db.visible_article_mut(&slug, Some(me.id))?;

    if !article.favorited_by.insert(me.id) {
        return Err(AppError::bad_request("Article already favourited"));
    }
    let article_id = article.id;

    notify_author(&mut db, article_id, me.id, Verb::ArticleFavoriting);
    db.commit().await?;
    info!("{} favourited {slug}", me.username);

    Ok(JSend::message("Article favourited"))
}

pub async fn unfavorite_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let article = db.visible_article_mut(&slug, Some(me.id))?;

    if !article.favorited_by.remove(&me.id) {
        return Err(AppError::bad_request("Article not favourited"));
    }
    db.commit().await?;

    Ok(JSend::message("Article removed from favourites"))
}

pub async fn rate_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
    Payload(payload): Payload<RatingPayload>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let article = db.visible_article_mut(&slug, Some(me.id))?;

    if article.author_id == me.id {
        return Err(AppError::forbidden(OWN_RATING));
    }
    let rating = parse_rating(payload.rating.rating.as_ref())?;

    let (status, message) = match article.ratings.insert(me.id, rating) {
        None => (
            StatusCode::CREATED,
            "You have successfully rated this article",
        ),
        Some(_) => (StatusCode::OK, "Your rating has been updated"),
    };

    let view = RatingView {
        article: article.slug.clone(),
        rating,
        avg_rating: article.average_rating(),
    };
    db.commit().await?;

    Ok((status, JSend::named("rating", view).with_message(message)))
}

async fn react(
    state: &AppState,
    me: &User,
    slug: &str,
    reaction: Reaction,
) -> Result<ReactionsView, AppError> {
    let mut db = state.db.write().await;
    let article = db.visible_article_mut(slug, Some(me.id))?;

    let set = article.reactions.toggle(me.id, reaction);
    let article_id = article.id;
    let view = ReactionsView::new(&article.reactions, Some(me.id));

    if set {
        let verb = match reaction {
            Reaction::Like => Verb::ArticleLike,
            Reaction::Dislike => Verb::ArticleDislike,
        };
        notify_author(&mut db, article_id, me.id, verb);
    }
    db.commit().await?;

    Ok(view)
}

pub async fn like_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = react(&state, &me, &slug, Reaction::Like).await?;

    Ok(JSend::named("reactions", view))
}

pub async fn dislike_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let view = react(&state, &me, &slug, Reaction::Dislike).await?;

    Ok(JSend::named("reactions", view))
}
