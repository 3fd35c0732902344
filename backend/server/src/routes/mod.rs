use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRequest, FromRequestParts},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

pub mod articles;
pub mod comments;
pub mod engagement;
pub mod notifications;
pub mod profiles;
pub mod reports;
pub mod tags;
pub mod users;

use crate::{error::AppError, render::JSend, state::AppState};

/// JSON body whose rejection renders through [`AppError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Payload<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

async fn unknown_route() -> AppError {
    AppError::not_found("Resource not found")
}

async fn wrong_method() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        JSend::error("Method not allowed"),
    )
}

pub fn router(state: Arc<AppState>) -> Router {
    let users = Router::new()
        .route("/users", post(users::register_handler))
        .route("/users/login", post(users::login_handler))
        .route("/users/verify", post(users::verify_handler))
        .route("/users/verify/resend", post(users::resend_verification_handler))
        .route("/users/password/forgot", post(users::forgot_password_handler))
        .route("/users/password/reset", put(users::reset_password_handler))
        .route("/users/social", post(users::social_login_handler))
        .route(
            "/user",
            get(users::current_user_handler).put(users::update_user_handler),
        )
        .route("/user/subscription", put(users::subscription_handler));

    let profiles = Router::new()
        .route("/profiles", get(profiles::list_handler))
        .route(
            "/profiles/{username}",
            get(profiles::get_handler).put(profiles::update_handler),
        )
        .route(
            "/profiles/{username}/follow",
            post(profiles::follow_handler).delete(profiles::unfollow_handler),
        )
        .route("/profiles/{username}/followers", get(profiles::followers_handler))
        .route("/profiles/{username}/following", get(profiles::following_handler));

    let articles = Router::new()
        .route(
            "/articles",
            get(articles::list_handler).post(articles::create_handler),
        )
        .route("/articles/feed", get(articles::feed_handler))
        .route("/articles/stats", get(articles::stats_handler))
        .route(
            "/articles/{slug}",
            get(articles::get_handler)
                .put(articles::update_handler)
                .delete(articles::delete_handler),
        )
        .route(
            "/articles/{slug}/tags",
            get(tags::article_tags_handler)
                .post(tags::tag_article_handler)
                .delete(tags::untag_article_handler),
        )
        .route(
            "/articles/{slug}/favorite",
            post(engagement::favorite_handler).delete(engagement::unfavorite_handler),
        )
        .route("/articles/{slug}/rate", post(engagement::rate_handler))
        .route("/articles/{slug}/like", put(engagement::like_handler))
        .route("/articles/{slug}/dislike", put(engagement::dislike_handler))
        .route("/articles/{slug}/report", post(reports::report_handler))
        .route(
            "/articles/{slug}/comments",
            get(comments::list_handler).post(comments::create_handler),
        )
        .route(
            "/articles/{slug}/comments/{id}",
            get(comments::thread_handler)
                .post(comments::reply_handler)
                .put(comments::update_handler)
                .delete(comments::delete_handler),
        )
        .route("/articles/{slug}/comments/{id}/like", put(comments::like_handler))
        .route(
            "/articles/{slug}/comments/{id}/dislike",
            put(comments::dislike_handler),
        )
        .route("/tags", get(tags::list_handler))
        .route("/reports", get(reports::list_handler));

    let notifications = Router::new()
        .route(
            "/notifications/{filter}",
            get(notifications::list_handler).delete(notifications::delete_handler),
        )
        .route("/notifications/read/{id}", put(notifications::mark_read_handler));

    let api = users
        .merge(profiles)
        .merge(articles)
        .merge(notifications)
        .method_not_allowed_fallback(wrong_method);

    Router::new()
        .nest("/api", api)
        .fallback(unknown_route)
        .with_state(state)
}
