use std::{collections::BTreeSet, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{Path, Payload, Query, profiles::ProfileView};
use crate::{
    auth::{CurrentUser, MaybeUser, VerifiedUser},
    database::{ARTICLE_NOT_FOUND, NewArticle, Tables},
    error::{AppError, FieldErrors},
    fanout::announce_article,
    models::{Article, Id, Reactions},
    render::JSend,
    state::AppState,
    utils::{is_valid_image_url, read_time, slugify},
};

pub const NOT_OWNER: &str = "You are not allowed to modify this article.";

const MAX_TITLE_LEN: usize = 255;
pub const MAX_TAG_LEN: usize = 28;
const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Serialize)]
pub struct Counter {
    pub count: usize,
    pub me: bool,
}

#[derive(Serialize)]
pub struct ReactionsView {
    pub likes: Counter,
    pub dislikes: Counter,
}

impl ReactionsView {
    pub fn new(reactions: &Reactions, viewer: Option<Id>) -> Self {
        let mine = |set: &BTreeSet<Id>| viewer.is_some_and(|id| set.contains(&id));

        Self {
            likes: Counter {
                count: reactions.likes.len(),
                me: mine(&reactions.likes),
            },
            dislikes: Counter {
                count: reactions.dislikes.len(),
                me: mine(&reactions.dislikes),
            },
        }
    }
}

#[derive(Serialize)]
pub struct ArticleView {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub published: bool,
    pub read_time: usize,
    pub avg_rating: f64,
    pub author: ProfileView,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub favorited: bool,
    pub favorites_count: usize,
    pub reactions: ReactionsView,
}

impl ArticleView {
    pub fn build(tables: &Tables, article: &Article, viewer: Option<Id>) -> Self {
        Self {
            slug: article.slug.clone(),
            title: article.title.clone(),
            description: article.description.clone(),
            body: article.body.clone(),
            published: article.published,
            read_time: read_time(&article.body),
            avg_rating: article.average_rating(),
            author: ProfileView::of(tables, article.author_id, viewer),
            image: article.image.clone(),
            created_at: article.created_at,
            updated_at: article.updated_at,
            tags: tables.tag_names(article),
            favorited: viewer.is_some_and(|id| article.favorited_by.contains(&id)),
            favorites_count: article.favorited_by.len(),
            reactions: ReactionsView::new(&article.reactions, viewer),
        }
    }
}

#[derive(Serialize)]
pub struct ArticleList {
    pub count: usize,
    pub articles: Vec<ArticleView>,
}

#[derive(Serialize)]
pub struct ArticleStats {
    pub slug: String,
    pub title: String,
    pub view_count: usize,
    pub comment_count: usize,
}

#[derive(Deserialize, Default)]
pub struct ArticlePayload {
    #[serde(default)]
    pub article: ArticleInput,
}

#[derive(Deserialize, Default)]
pub struct ArticleInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub published: Option<bool>,
    pub image: Option<String>,
    /// Kept loose so a non-list gets a readable message instead of a parse error.
    pub tags: Option<Value>,
}

#[derive(Deserialize, Default)]
pub struct ArticleQuery {
    pub author: Option<String>,
    pub tag: Option<String>,
    pub title: Option<String>,
    pub search: Option<String>,
    pub favorited: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Tag names from a JSON value that must be a list of non-blank short strings.
pub fn parse_tags(value: &Value, errors: &mut FieldErrors) -> Vec<String> {
    let Some(items) = value.as_array() else {
        errors.add("tags", "The tags must be a list of strings");
        return Vec::new();
    };

    let mut tags = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str().map(str::trim) {
            None => {
                errors.add("tags", "The tags must be a list of strings");
                return Vec::new();
            }
            Some("") => errors.add("tags", "Please specify a tag"),
            Some(tag) if tag.chars().count() > MAX_TAG_LEN => {
                errors.add("tags", "Tag cannot be more than 28 characters")
            }
            Some(tag) => tags.push(tag.to_string()),
        }
    }

    tags
}

/// Validates `input`; `partial` lets absent fields through for updates.
fn validate(input: &ArticleInput, partial: bool, errors: &mut FieldErrors) -> Option<Vec<String>> {
    let mut check = |field: &str, value: &Option<String>, missing: &str| match value {
        None if partial => {}
        Some(text) if !text.trim().is_empty() => {}
        _ => errors.add(field, missing),
    };

    check("title", &input.title, "The article must have a title");
    check("description", &input.description, "The article must have a description");
    check("body", &input.body, "The article must have a body");

    if input
        .title
        .as_ref()
        .is_some_and(|t| t.chars().count() > MAX_TITLE_LEN)
    {
        errors.add("title", "The article title cannot be more than 255 characters");
    }

    if let Some(image) = input.image.as_deref().filter(|i| !i.is_empty()) {
        if !is_valid_image_url(image) {
            errors.add("image", "Enter a valid URL.");
        }
    }

    input.tags.as_ref().map(|value| parse_tags(value, errors))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    VerifiedUser(me): VerifiedUser,
    Payload(payload): Payload<ArticlePayload>,
) -> Result<impl IntoResponse, AppError> {
    let input = payload.article;
    let mut errors = FieldErrors::new();
    let tags = validate(&input, false, &mut errors).unwrap_or_default();
    errors.into_result()?;

    let mut db = state.db.write().await;
    let article_id = db
        .insert_article(
            me.id,
            NewArticle {
                title: input.title.unwrap_or_default().trim().to_string(),
                description: input.description.unwrap_or_default(),
                body: input.body.unwrap_or_default(),
                image: input.image.filter(|i| !i.is_empty()),
                published: input.published.unwrap_or(false),
                tags,
            },
        )
        .id;

    announce_article(&mut db, &state.mailer, article_id);
    db.commit().await?;

    let article = &db.articles[&article_id];
    info!("{} created article {}", me.username, article.slug);

    Ok((
        StatusCode::CREATED,
        JSend::named("article", ArticleView::build(&db, article, Some(me.id))),
    ))
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Query(query): Query<ArticleQuery>,
) -> Result<impl IntoResponse, AppError> {
    let db = state.db.read().await;
    let viewer = viewer.id();

    let author = match &query.author {
        Some(name) => Some(db.user_by_username(name).map(|u| u.id)),
        None => None,
    };
    let fan = match &query.favorited {
        Some(name) => Some(db.user_by_username(name).map(|u| u.id)),
        None => None,
    };
    let tag = query.tag.as_deref().map(|t| {
        let slug = slugify(t);
        db.tag_by_slug(&slug)
            .or_else(|| db.tags.values().find(|tag| tag.tag.eq_ignore_ascii_case(t)))
            .map(|tag| tag.id)
    });
    let title = query.title.as_deref().map(str::to_lowercase);
    let search = query.search.as_deref().map(str::to_lowercase);

    let matches: Vec<&Article> = db
        .articles
        .values()
        .rev()
        .filter(|a| a.is_visible_to(viewer))
        .filter(|a| author.is_none_or(|id| id == Some(a.author_id)))
        .filter(|a| fan.is_none_or(|id| id.is_some_and(|id| a.favorited_by.contains(&id))))
        .filter(|a| tag.is_none_or(|id| id.is_some_and(|id| a.tag_ids.contains(&id))))
        .filter(|a| {
            title
                .as_deref()
                .is_none_or(|t| a.title.to_lowercase().contains(t))
        })
        .filter(|a| {
            search.as_deref().is_none_or(|s| {
                a.title.to_lowercase().contains(s)
                    || a.description.to_lowercase().contains(s)
                    || a.body.to_lowercase().contains(s)
            })
        })
        .collect();

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let articles = matches
        .iter()
        .skip(offset)
        .take(limit)
        .map(|a| ArticleView::build(&db, a, viewer))
        .collect();

    Ok(JSend::data(ArticleList {
        count: matches.len(),
        articles,
    }))
}

pub async fn feed_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let db = state.db.read().await;

    let articles: Vec<ArticleView> = db
        .articles
        .values()
        .rev()
        .filter(|a| a.published && me.following.contains(&a.author_id))
        .map(|a| ArticleView::build(&db, a, Some(me.id)))
        .collect();

    Ok(JSend::data(ArticleList {
        count: articles.len(),
        articles,
    }))
}

pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let viewer = viewer.id();
    let mut db = state.db.write().await;

    let article = db.visible_article_mut(&slug, viewer)?;
    let first_view = viewer
        .filter(|&id| id != article.author_id)
        .is_some_and(|id| article.viewers.insert(id));
    if first_view {
        db.commit().await?;
    }

    let article = db.article_by_slug(&slug)?;

    Ok(JSend::named("article", ArticleView::build(&db, article, viewer)))
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
    Payload(payload): Payload<ArticlePayload>,
) -> Result<impl IntoResponse, AppError> {
    let input = payload.article;

    let mut db = state.db.write().await;
    let article = db.visible_article(&slug, Some(me.id))?;
    if article.author_id != me.id {
        return Err(AppError::forbidden(NOT_OWNER));
    }
    let article_id = article.id;

    let mut errors = FieldErrors::new();
    let tags = validate(&input, true, &mut errors);
    errors.into_result()?;

    let tag_ids = tags.map(|names| db.resolve_tags(&names));

    let Some(article) = db.articles.get_mut(&article_id) else {
        return Err(AppError::not_found(ARTICLE_NOT_FOUND));
    };
    if let Some(title) = input.title {
        article.title = title.trim().to_string();
    }
    if let Some(description) = input.description {
        article.description = description;
    }
    if let Some(body) = input.body {
        article.body = body;
    }
    if let Some(image) = input.image {
        article.image = Some(image).filter(|i| !i.is_empty());
    }
    if let Some(published) = input.published {
        article.published = published;
    }
    if let Some(tag_ids) = tag_ids {
        article.tag_ids = tag_ids;
    }
    article.updated_at = Utc::now();

    announce_article(&mut db, &state.mailer, article_id);
    db.commit().await?;

    let article = &db.articles[&article_id];

    Ok(JSend::named("article", ArticleView::build(&db, article, Some(me.id))))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let article = db.visible_article(&slug, Some(me.id))?;
    if article.author_id != me.id {
        return Err(AppError::forbidden(NOT_OWNER));
    }

    let article_id = article.id;
    db.delete_article(article_id);
    db.commit().await?;

    info!("{} deleted article {slug}", me.username);

    Ok(JSend::message("Article deleted successfully"))
}

pub async fn stats_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let db = state.db.read().await;

    let stats: Vec<ArticleStats> = db
        .articles
        .values()
        .filter(|a| a.author_id == me.id)
        .map(|a| ArticleStats {
            slug: a.slug.clone(),
            title: a.title.clone(),
            view_count: a.viewers.len(),
            comment_count: db.comment_count(a.id),
        })
        .collect();

    Ok(JSend::named("stats", stats))
}
