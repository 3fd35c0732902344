use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Path, Payload};
use crate::{
    auth::CurrentUser,
    database::Tables,
    error::{AppError, FieldErrors},
    models::{Violation, ViolationType},
    render::JSend,
    state::AppState,
};

pub const OWN_ARTICLE: &str = "You cannot report your own article.";
pub const STAFF_ONLY: &str = "Only staff can view reports";

#[derive(Deserialize, Default)]
pub struct ReportPayload {
    #[serde(default)]
    pub report: ReportInput,
}

#[derive(Deserialize, Default)]
pub struct ReportInput {
    pub violation_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct ViolationTypeView {
    pub value: &'static str,
    pub display: &'static str,
}

impl From<ViolationType> for ViolationTypeView {
    fn from(kind: ViolationType) -> Self {
        Self {
            value: kind.value(),
            display: kind.display(),
        }
    }
}

#[derive(Serialize)]
pub struct ReportView {
    pub violation_type: ViolationTypeView,
    pub article: String,
    pub description: String,
    pub reporter: String,
    pub reportee: String,
    pub created_at: DateTime<Utc>,
}

impl ReportView {
    fn build(tables: &Tables, violation: &Violation) -> Self {
        let article = tables.articles.get(&violation.article_id);
        let email = |id| {
            tables
                .user(id)
                .map(|user| user.email.clone())
                .unwrap_or_default()
        };

        Self {
            violation_type: violation.kind.into(),
            article: article.map(|a| a.slug.clone()).unwrap_or_default(),
            description: violation.description.clone(),
            reporter: email(violation.reporter_id),
            reportee: article.map(|a| email(a.author_id)).unwrap_or_default(),
            created_at: violation.created_at,
        }
    }
}

fn validate(input: ReportInput) -> Result<(ViolationType, String), AppError> {
    let mut errors = FieldErrors::new();

    let kind = match input.violation_type.as_deref() {
        None | Some("") => {
            errors.add("violation_type", "This field is required.");
            None
        }
        Some(value) => {
            let kind = ViolationType::parse(value);
            if kind.is_none() {
                errors.add(
                    "violation_type",
                    format!("\"{value}\" is not a valid choice."),
                );
            }
            kind
        }
    };

    let description = input
        .description
        .filter(|description| !description.trim().is_empty());
    if description.is_none() {
        errors.add("description", "This field is required.");
    }

    errors.into_result()?;

    match (kind, description) {
        (Some(kind), Some(description)) => Ok((kind, description)),
        _ => Err(AppError::MalformedPayload),
    }
}

pub async fn report_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(slug): Path<String>,
    Payload(payload): Payload<ReportPayload>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;
    let article = db.visible_article(&slug, Some(me.id))?;

    if article.author_id == me.id {
        return Err(AppError::forbidden(OWN_ARTICLE));
    }
    let article_id = article.id;

    let (kind, description) = validate(payload.report)?;

    let violation = db
        .insert_violation(|id| Violation {
            id,
            reporter_id: me.id,
            article_id,
            kind,
            description,
            created_at: Utc::now(),
        })
        .clone();
    db.commit().await?;

    warn!("{} reported {slug} for {}", me.username, kind.value());

    Ok((
        StatusCode::CREATED,
        JSend::named("report", ReportView::build(&db, &violation)),
    ))
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    if !me.is_staff {
        return Err(AppError::forbidden(STAFF_ONLY));
    }

    let db = state.db.read().await;
    let reports: Vec<ReportView> = db
        .violations
        .values()
        .map(|violation| ReportView::build(&db, violation))
        .collect();

    Ok(JSend::named("reports", reports))
}
