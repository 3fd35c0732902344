use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Path, Payload, articles::parse_tags};
use crate::{
    auth::{CurrentUser, MaybeUser},
    database::{ARTICLE_NOT_FOUND, Tables},
    error::{AppError, FieldErrors},
    models::Id,
    render::JSend,
    state::AppState,
};

#[derive(Serialize)]
pub struct TagView {
    pub tag: String,
    pub slug: String,
}

#[derive(Serialize)]
pub struct ArticleTags {
    pub article: String,
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct TagsPayload {
    #[serde(default)]
    pub tags: Value,
}

impl ArticleTags {
    fn of(tables: &Tables, article_id: Id) -> Self {
        let article = &tables.articles[&article_id];

        Self {
            article: article.slug.clone(),
            tags: tables.tag_names(article),
        }
    }
}

/// Article id for `slug` when `me` wrote it. Other users see a missing article.
fn owned_article(tables: &Tables, slug: &str, me: Id) -> Result<Id, AppError> {
    tables
        .article_by_slug(slug)
        .ok()
        .filter(|article| article.author_id == me)
        .map(|article| article.id)
        .ok_or_else(|| AppError::not_found(ARTICLE_NOT_FOUND))
}

fn tag_names(payload: &TagsPayload) -> Result<Vec<String>, AppError> {
    let mut errors = FieldErrors::new();
    let tags = parse_tags(&payload.tags, &mut errors);
    errors.into_result()?;

    Ok(tags)
}

pub async fn list_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db = state.db.read().await;

    let tags: Vec<TagView> = db
        .tags
        .values()
        .map(|tag| TagView {
            tag: tag.tag.clone(),
            slug: tag.slug.clone(),
        })
        .collect();

    JSend::named("tags", tags)
}

pub async fn article_tags_handler(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let db = state.db.read().await;
    let article_id = db.visible_article(&slug, viewer.id())?.id;

    Ok(JSend::data(ArticleTags::of(&db, article_id)))
}

pub async fn tag_article_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
    Payload(payload): Payload<TagsPayload>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let article_id = owned_article(&db, &slug, me.id)?;
    let names = tag_names(&payload)?;

    let new_ids = db.resolve_tags(&names);
    if let Some(article) = db.articles.get_mut(&article_id) {
        for id in new_ids {
            if !article.tag_ids.contains(&id) {
                article.tag_ids.push(id);
            }
        }
        article.updated_at = Utc::now();
    }
    db.commit().await?;

    Ok(JSend::data(ArticleTags::of(&db, article_id)).with_message("Tags added"))
}

pub async fn untag_article_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
    Payload(payload): Payload<TagsPayload>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let article_id = owned_article(&db, &slug, me.id)?;
    let names = tag_names(&payload)?;

    let removed: Vec<Id> = names
        .iter()
        .filter_map(|name| db.find_tag(name))
        .map(|tag| tag.id)
        .collect();

    if let Some(article) = db.articles.get_mut(&article_id) {
        article.tag_ids.retain(|id| !removed.contains(id));
        article.updated_at = Utc::now();
    }
    db.commit().await?;

    Ok(JSend::data(ArticleTags::of(&db, article_id)).with_message("Tags removed"))
}
