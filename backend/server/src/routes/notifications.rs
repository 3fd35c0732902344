use std::sync::Arc;

use axum::{extract::State, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::Path;
use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{Id, Notification, Verb},
    render::JSend,
    state::AppState,
};

pub const NOTIFICATION_NOT_FOUND: &str = "Notification not found";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    All,
    Unread,
    Read,
    Unsent,
    Sent,
}

impl Filter {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Filter::All),
            "unread" => Some(Filter::Unread),
            "read" => Some(Filter::Read),
            "unsent" => Some(Filter::Unsent),
            "sent" => Some(Filter::Sent),
            _ => None,
        }
    }

    pub fn matches(self, notification: &Notification) -> bool {
        !notification.deleted
            && match self {
                Filter::All => true,
                Filter::Unread => notification.unread,
                Filter::Read => !notification.unread,
                Filter::Unsent => !notification.sent,
                Filter::Sent => notification.sent,
            }
    }

    /// Listing these counts as delivering them.
    fn delivers(self) -> bool {
        matches!(self, Filter::All | Filter::Unread)
    }
}

#[derive(Serialize)]
pub struct NotificationView {
    pub id: Id,
    pub actor: String,
    pub verb: Verb,
    pub description: String,
    pub target: Option<String>,
    pub unread: bool,
    pub timestamp: DateTime<Utc>,
}

impl From<&Notification> for NotificationView {
    fn from(notification: &Notification) -> Self {
        Self {
            id: notification.id,
            actor: notification.actor.clone(),
            verb: notification.verb,
            description: notification.description.clone(),
            target: notification.target.clone(),
            unread: notification.unread,
            timestamp: notification.timestamp,
        }
    }
}

#[derive(Serialize)]
pub struct NotificationList {
    pub count: usize,
    pub notifications: Vec<NotificationView>,
}

fn filter_from(path: &str) -> Result<Filter, AppError> {
    Filter::parse(path).ok_or_else(|| AppError::not_found(format!("Unknown filter '{path}'")))
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(filter): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let filter = filter_from(&filter)?;
    let mut db = state.db.write().await;

    let mut notifications = Vec::new();
    let mut delivered = 0;
    for notification in db.notifications.values_mut().rev() {
        if notification.recipient_id != me.id || !filter.matches(notification) {
            continue;
        }

        notifications.push(NotificationView::from(&*notification));
        if filter.delivers() && !notification.sent {
            notification.sent = true;
            delivered += 1;
        }
    }
    if delivered > 0 {
        db.commit().await?;
    }

    Ok(JSend::data(NotificationList {
        count: notifications.len(),
        notifications,
    }))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(filter): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let filter = filter_from(&filter)?;
    let mut db = state.db.write().await;

    let mut deleted = 0;
    for notification in db.notifications.values_mut() {
        if notification.recipient_id == me.id && filter.matches(notification) {
            notification.deleted = true;
            deleted += 1;
        }
    }
    db.commit().await?;

    Ok(JSend::message(format!("{deleted} notifications deleted")))
}

pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<Id>,
) -> Result<impl IntoResponse, AppError> {
    let mut db = state.db.write().await;

    let notification = db
        .notifications
        .get_mut(&id)
        .filter(|n| n.recipient_id == me.id && !n.deleted)
        .ok_or_else(|| AppError::not_found(NOTIFICATION_NOT_FOUND))?;
    notification.unread = false;
    db.commit().await?;

    Ok(JSend::message("Notification has been read"))
}
