use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Path, Payload, articles::ReactionsView, profiles::ProfileView};
use crate::{
    auth::{CurrentUser, MaybeUser},
    database::Tables,
    error::{AppError, FieldErrors},
    models::{Comment, Id, Reaction},
    render::JSend,
    state::AppState,
};

pub const NOT_AUTHOR: &str = "You are not allowed to modify this comment.";

#[derive(Serialize)]
pub struct CommentView {
    pub id: Id,
    pub body: String,
    pub author: ProfileView,
    pub parent: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reactions: ReactionsView,
    pub replies: Vec<CommentView>,
}

impl CommentView {
    /// Renders `comment` with its whole reply tree, oldest first.
    pub fn build(tables: &Tables, comment: &Comment, viewer: Option<Id>) -> Self {
        let replies = tables
            .replies_to(comment.id)
            .into_iter()
            .map(|reply| Self::build(tables, reply, viewer))
            .collect();

        Self {
            id: comment.id,
            body: comment.body.clone(),
            author: ProfileView::of(tables, comment.author_id, viewer),
            parent: comment.parent_id,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            reactions: ReactionsView::new(&comment.reactions, viewer),
            replies,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct CommentPayload {
    #[serde(default)]
    pub comment: CommentInput,
}

#[derive(Deserialize, Default)]
pub struct CommentInput {
    pub body: Option<String>,
}

fn body_of(payload: CommentPayload) -> Result<String, AppError> {
    let mut errors = FieldErrors::new();

    let body = payload
        .comment
        .body
        .filter(|body| !body.trim().is_empty());
    if body.is_none() {
        errors.add("body", "The comment must have a body");
    }
    errors.into_result()?;

    Ok(body.unwrap_or_default())
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = viewer.id();
    let db = state.db.read().await;
    let article = db.visible_article(&slug, viewer)?;

    let comments: Vec<CommentView> = db
        .top_level_comments(article.id)
        .into_iter()
        .map(|comment| CommentView::build(&db, comment, viewer))
        .collect();

    Ok(JSend::named("comments", comments))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
    Payload(payload): Payload<CommentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let body = body_of(payload)?;

    let mut db = state.db.write().await;
    let article_id = db.visible_article(&slug, Some(me.id))?.id;
    let comment_id = db.insert_comment(article_id, me.id, None, body).id;
    db.commit().await?;

    info!("{} commented on {slug}", me.username);

    let view = CommentView::build(&db, &db.comments[&comment_id], Some(me.id));

    Ok((StatusCode::CREATED, JSend::named("comment", view)))
}

pub async fn thread_handler(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Path((slug, id)): Path<(String, Id)>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = viewer.id();
    let db = state.db.read().await;
    let article = db.visible_article(&slug, viewer)?;
    let comment = db.comment_on(article.id, id)?;

    Ok(JSend::named("comment", CommentView::build(&db, comment, viewer)))
}

pub async fn reply_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path((slug, id)): Path<(String, Id)>,
    Payload(payload): Payload<CommentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let body = body_of(payload)?;

    let mut db = state.db.write().await;
    let article_id = db.visible_article(&slug, Some(me.id))?.id;
    let parent_id = db.comment_on(article_id, id)?.id;
    let reply_id = db.insert_comment(article_id, me.id, Some(parent_id), body).id;
    db.commit().await?;

    let view = CommentView::build(&db, &db.comments[&reply_id], Some(me.id));

    Ok((StatusCode::CREATED, JSend::named("comment", view)))
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path((slug, id)): Path<(String, Id)>,
    Payload(payload): Payload<CommentPayload>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let article_id = db.visible_article(&slug, Some(me.id))?.id;

    let comment = db.comment_on_mut(article_id, id)?;
    if comment.author_id != me.id {
        return Err(AppError::forbidden(NOT_AUTHOR));
    }

    comment.body = body_of(payload)?;
    comment.updated_at = Utc::now();
    db.commit().await?;

    let view = CommentView::build(&db, &db.comments[&id], Some(me.id));

    Ok(JSend::named("comment", view))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path((slug, id)): Path<(String, Id)>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let article_id = db.visible_article(&slug, Some(me.id))?.id;

    if db.comment_on(article_id, id)?.author_id != me.id {
        return Err(AppError::forbidden(NOT_AUTHOR));
    }

    db.delete_thread(id);
    db.commit().await?;

    Ok(JSend::message("Comment deleted successfully"))
}

async fn react(
    state: &AppState,
    me: Id,
    slug: &str,
    id: Id,
    reaction: Reaction,
) -> Result<ReactionsView, AppError> {
    let mut db = state.db.write().await;
    let article_id = db.visible_article(slug, Some(me))?.id;

    let comment = db.comment_on_mut(article_id, id)?;
    comment.reactions.toggle(me, reaction);
    let view = ReactionsView::new(&comment.reactions, Some(me));
    db.commit().await?;

    Ok(view)
}

pub async fn like_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path((slug, id)): Path<(String, Id)>,
) -> Result<impl IntoResponse, AppError> {
    let view = react(&state, me.id, &slug, id, Reaction::Like).await?;

    Ok(JSend::named("reactions", view))
}

pub async fn dislike_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path((slug, id)): Path<(String, Id)>,
) -> Result<impl IntoResponse, AppError> {
    let view = react(&state, me.id, &slug, id, Reaction::Dislike).await?;

    Ok(JSend::named("reactions", view))
}
