//! # JSend
//!
//! Every response body leaves the server in the same envelope.
//!
//! ```json
//! { "status": "success", "data": { "article": { ... } } }
//! { "status": "success", "message": "Article favourited" }
//! { "status": "error", "message": "This article does not exist!" }
//! { "status": "error", "data": { "title": ["The article must have a title"] } }
//! ```
//!
//! Named payloads use the singular name for one record and the plural for lists,
//! so clients can always reach for `data.article` or `data.articles`.
use std::collections::BTreeMap;

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Serialize)]
pub struct JSend<T = ()> {
    pub status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub type Named<T> = BTreeMap<&'static str, T>;

impl<T: Serialize> JSend<Named<T>> {
    pub fn named(name: &'static str, value: T) -> Self {
        JSend::data(BTreeMap::from([(name, value)]))
    }
}

impl<T: Serialize> JSend<T> {
    pub fn data(value: T) -> Self {
        Self {
            status: Status::Success,
            message: None,
            data: Some(value),
        }
    }

    pub fn fail(errors: T) -> Self {
        Self {
            status: Status::Error,
            message: None,
            data: Some(errors),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl JSend {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for JSend<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
