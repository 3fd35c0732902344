mod common;

use axum::http::StatusCode;
use common::TestApp;
use serde_json::json;
use server::config::Config;

#[tokio::test]
async fn test_favourite_round_trip() {
    let mut app = TestApp::new();
    let author = app.register("bev").await;
    let reader = app.register("moses").await;
    let slug = app.publish(&author, "Favourite me").await;
    let uri = format!("/api/articles/{slug}/favorite");

    let (status, body) = app.post(&uri, Some(&reader), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Article favourited");

    let (status, body) = app.post(&uri, Some(&reader), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Article already favourited");

    let (_, body) = app.get("/api/articles?favorited=moses", None).await;
    assert_eq!(body["data"]["count"], 1);

    let (_, body) = app.get(&format!("/api/articles/{slug}"), Some(&reader)).await;
    assert_eq!(body["data"]["article"]["favorited"], true);
    assert_eq!(body["data"]["article"]["favorites_count"], 1);

    let (status, body) = app.delete(&uri, Some(&reader)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Article removed from favourites");

    let (status, body) = app.delete(&uri, Some(&reader)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Article not favourited");

    let (status, body) = app
        .post("/api/articles/missing/favorite", Some(&reader), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "This article does not exist!");
}

#[tokio::test]
async fn test_rating() {
    let mut app = TestApp::new();
    let author = app.register("bev").await;
    let first = app.register("moses").await;
    let second = app.register("ann").await;
    let slug = app.publish(&author, "Rate me").await;
    let uri = format!("/api/articles/{slug}/rate");

    let (status, body) = app
        .post(&uri, Some(&author), json!({"rating": {"rating": 5}}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You cannot rate your own article.");

    let (status, body) = app
        .post(&uri, Some(&first), json!({"rating": {"rating": 6}}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Rating should be a number between 1 and 5!");

    let (status, body) = app
        .post(&uri, Some(&first), json!({"rating": {"rating": 2}}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "You have successfully rated this article");

    let (status, body) = app
        .post(&uri, Some(&first), json!({"rating": {"rating": 4}}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Your rating has been updated");

    let (_, body) = app
        .post(&uri, Some(&second), json!({"rating": {"rating": 5}}))
        .await;
    assert_eq!(body["data"]["rating"]["avg_rating"], 4.5);
}

#[tokio::test]
async fn test_like_and_dislike_are_exclusive() {
    let mut app = TestApp::new();
    let author = app.register("bev").await;
    let reader = app.register("moses").await;
    let slug = app.publish(&author, "React").await;

    let (status, body) = app
        .put(&format!("/api/articles/{slug}/like"), Some(&reader), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reactions"]["likes"], json!({"count": 1, "me": true}));

    let (_, body) = app
        .put(&format!("/api/articles/{slug}/dislike"), Some(&reader), json!({}))
        .await;
    assert_eq!(body["data"]["reactions"]["likes"]["count"], 0);
    assert_eq!(body["data"]["reactions"]["dislikes"], json!({"count": 1, "me": true}));

    let (_, body) = app
        .put(&format!("/api/articles/{slug}/dislike"), Some(&reader), json!({}))
        .await;
    assert_eq!(body["data"]["reactions"]["dislikes"]["count"], 0);
}

#[tokio::test]
async fn test_comment_threads() {
    let mut app = TestApp::new();
    let author = app.register("bev").await;
    let reader = app.register("moses").await;
    let slug = app.publish(&author, "Discuss").await;
    let uri = format!("/api/articles/{slug}/comments");

    let (status, body) = app.post(&uri, Some(&reader), json!({"comment": {}})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["body"][0], "The comment must have a body");

    let (status, _) = app
        .post(&uri, None, json!({"comment": {"body": "anonymous"}}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(&uri, Some(&reader), json!({"comment": {"body": "First!"}}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let root = body["data"]["comment"]["id"].as_u64().unwrap();
    assert_eq!(body["data"]["comment"]["author"]["username"], "moses");

    let (status, body) = app
        .post(
            &format!("{uri}/{root}"),
            Some(&author),
            json!({"comment": {"body": "Thanks"}}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["comment"]["parent"], root);

    let (_, body) = app.get(&uri, None).await;
    let comments = body["data"]["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["replies"][0]["body"], "Thanks");

    let (status, _) = app
        .put(
            &format!("{uri}/{root}"),
            Some(&author),
            json!({"comment": {"body": "edited"}}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put(
            &format!("{uri}/{root}"),
            Some(&reader),
            json!({"comment": {"body": "edited"}}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["comment"]["body"], "edited");

    let (_, body) = app
        .put(&format!("{uri}/{root}/like"), Some(&author), json!({}))
        .await;
    assert_eq!(body["data"]["reactions"]["likes"]["count"], 1);

    let (status, _) = app.delete(&format!("{uri}/{root}"), Some(&reader)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get(&uri, None).await;
    assert!(body["data"]["comments"].as_array().unwrap().is_empty());

    let (status, _) = app.get(&format!("{uri}/{root}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profiles_and_following() {
    let mut app = TestApp::new();
    let bev = app.register("bev").await;
    let moses = app.register("moses").await;

    let (status, body) = app.post("/api/profiles/bev/follow", Some(&bev), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You cannot follow yourself.");

    let (status, body) = app.post("/api/profiles/bev/follow", Some(&moses), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["profile"]["following"], true);

    let (status, _) = app.post("/api/profiles/bev/follow", Some(&moses), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get("/api/profiles/bev/followers", Some(&bev)).await;
    assert_eq!(body["data"]["followers"][0]["username"], "moses");

    let (_, body) = app.get("/api/profiles/moses/following", Some(&bev)).await;
    assert_eq!(body["data"]["following"][0]["username"], "bev");

    let (status, _) = app
        .put("/api/profiles/bev", Some(&moses), json!({"bio": "hacked"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/api/profiles/ghost", Some(&bev)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Profile does not exist.");

    let (status, body) = app.delete("/api/profiles/bev/follow", Some(&moses)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["profile"]["following"], false);
}

#[tokio::test]
async fn test_publish_fans_out_to_followers() {
    let mut app = TestApp::new();
    let author = app.register("bev").await;
    let fan = app.register("moses").await;
    let quiet = app.register("ann").await;

    app.post("/api/profiles/bev/follow", Some(&fan), json!({})).await;
    app.post("/api/profiles/bev/follow", Some(&quiet), json!({})).await;
    app.put("/api/user/subscription", Some(&quiet), json!({"subscribed": false}))
        .await;

    let (status, _) = app
        .post(
            "/api/articles",
            Some(&author),
            json!({"article": {"title": "Later", "description": "d", "body": "b"}}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = app.get("/api/notifications/all", Some(&fan)).await;
    assert_eq!(body["data"]["count"], 0);

    app.put(
        "/api/articles/later",
        Some(&author),
        json!({"article": {"published": true}}),
    )
    .await;
    app.put(
        "/api/articles/later",
        Some(&author),
        json!({"article": {"body": "edited"}}),
    )
    .await;

    let emails = app.drain_outbox();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "moses@authors.io");

    let (_, body) = app.get("/api/notifications/unsent", Some(&quiet)).await;
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["notifications"][0]["verb"], "article_creation");
    assert_eq!(body["data"]["notifications"][0]["target"], "later");

    let (_, body) = app.get("/api/notifications/unread", Some(&fan)).await;
    assert_eq!(body["data"]["count"], 1);
    let id = body["data"]["notifications"][0]["id"].as_u64().unwrap();

    let (_, body) = app.get("/api/notifications/sent", Some(&fan)).await;
    assert_eq!(body["data"]["count"], 1);

    let (status, _) = app
        .put(&format!("/api/notifications/read/{id}"), Some(&quiet), json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .put(&format!("/api/notifications/read/{id}"), Some(&fan), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Notification has been read");

    let (_, body) = app.get("/api/notifications/read", Some(&fan)).await;
    assert_eq!(body["data"]["count"], 1);

    let (status, body) = app.delete("/api/notifications/all", Some(&fan)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "1 notifications deleted");

    let (_, body) = app.get("/api/notifications/all", Some(&fan)).await;
    assert_eq!(body["data"]["count"], 0);

    let (status, _) = app.get("/api/notifications/archived", Some(&fan)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reactions_notify_the_author() {
    let mut app = TestApp::new();
    let author = app.register("bev").await;
    let reader = app.register("moses").await;
    let slug = app.publish(&author, "Liked").await;

    app.put(&format!("/api/articles/{slug}/like"), Some(&author), json!({}))
        .await;
    app.put(&format!("/api/articles/{slug}/like"), Some(&reader), json!({}))
        .await;
    app.post(&format!("/api/articles/{slug}/favorite"), Some(&reader), json!({}))
        .await;

    let (_, body) = app.get("/api/notifications/all", Some(&author)).await;
    assert_eq!(body["data"]["count"], 2);
    let verbs: Vec<_> = body["data"]["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["verb"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(verbs, vec!["article_favoriting", "article_like"]);
}

#[tokio::test]
async fn test_reports() {
    let config = Config {
        staff_emails: vec!["admin@authors.io".to_string()],
        ..Config::default()
    };
    let mut app = TestApp::with_config(config);
    let author = app.register("bev").await;
    let reader = app.register("moses").await;
    let admin = app.register("admin").await;
    let slug = app.publish(&author, "Reported").await;
    let uri = format!("/api/articles/{slug}/report");

    let (status, _) = app
        .post(
            &uri,
            Some(&author),
            json!({"report": {"violation_type": "spam", "description": "self"}}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .post(
            &uri,
            Some(&reader),
            json!({"report": {"violation_type": "rude", "description": "meh"}}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["violation_type"][0], "\"rude\" is not a valid choice.");

    let (status, body) = app
        .post(
            &uri,
            Some(&reader),
            json!({"report": {"violation_type": "plagiarism", "description": "Copied"}}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let report = &body["data"]["report"];
    assert_eq!(
        report["violation_type"],
        json!({"value": "plagiarism", "display": "Plagiarism"})
    );
    assert_eq!(report["article"], "reported");
    assert_eq!(report["reporter"], "moses@authors.io");
    assert_eq!(report["reportee"], "bev@authors.io");

    let (status, body) = app.get("/api/reports", Some(&reader)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Only staff can view reports");

    let (status, body) = app.get("/api/reports", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["reports"].as_array().unwrap().len(), 1);
}
