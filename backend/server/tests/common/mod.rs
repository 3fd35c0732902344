#![allow(dead_code)]

use std::{path::Path, sync::Arc};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use server::{
    app,
    config::Config,
    database::Database,
    mail::{Email, Mailer, token_from_body},
    state::AppState,
    tokens::TokenStore,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tower::ServiceExt;

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub outbox: UnboundedReceiver<Email>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let (state, outbox) = AppState::detached(config);

        Self {
            router: app(state.clone()),
            state,
            outbox,
        }
    }

    /// App whose store commits to a snapshot at `path`.
    pub async fn persistent(path: &Path) -> Self {
        let db = Database::open(path).await.unwrap();
        let (mailer, outbox) = Mailer::channel();
        let state = AppState::from_parts(Config::default(), db, TokenStore::memory(), mailer);

        Self {
            router: app(state.clone()),
            state,
            outbox,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Next queued email, panics when the outbox is empty.
    pub fn next_email(&mut self) -> Email {
        self.outbox.try_recv().expect("an email should have been queued")
    }

    pub fn drain_outbox(&mut self) -> Vec<Email> {
        let mut emails = Vec::new();
        while let Ok(email) = self.outbox.try_recv() {
            emails.push(email);
        }

        emails
    }

    /// Registers `name` without verifying the email. Returns the JWT.
    pub async fn register_unverified(&mut self, name: &str) -> String {
        let (status, body) = self
            .post(
                "/api/users",
                None,
                json!({
                    "user": {
                        "username": name,
                        "email": format!("{name}@authors.io"),
                        "password": "Passw0rd!",
                    }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        body["data"]["user"]["token"].as_str().unwrap().to_string()
    }

    /// Registers and verifies `name`. Returns the JWT.
    pub async fn register(&mut self, name: &str) -> String {
        let token = self.register_unverified(name).await;

        let email = self.next_email();
        let link_token = token_from_body(&email.body).unwrap().to_string();
        let (status, body) = self
            .post("/api/users/verify", None, json!({ "token": link_token }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        token
    }

    /// Creates a published article and returns its slug.
    pub async fn publish(&self, token: &str, title: &str) -> String {
        let (status, body) = self
            .post(
                "/api/articles",
                Some(token),
                json!({
                    "article": {
                        "title": title,
                        "description": "A short description",
                        "body": "The body of the article",
                        "published": true,
                        "tags": ["rust"],
                    }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        body["data"]["article"]["slug"].as_str().unwrap().to_string()
    }
}
