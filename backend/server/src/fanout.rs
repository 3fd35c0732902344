//! # Notification fan-out
//!
//! Publishing an article notifies every follower of its author once:
//!
//! - In-app notification for every follower
//! - Email on top of that for followers who kept `is_subscribed`
//!
//! Reactions and favourites notify the article author, never the actor themself.
use tracing::info;

use crate::{
    database::Tables,
    mail::{Mailer, new_article_email},
    models::{Id, Verb},
};

/// Fans out a published, not yet announced article. Safe to call after any save.
pub fn announce_article(tables: &mut Tables, mailer: &Mailer, article_id: Id) {
    let Some(article) = tables.articles.get(&article_id) else {
        return;
    };
    if !article.published || article.announced {
        return;
    }

    let author = tables
        .user(article.author_id)
        .map(|user| user.username.clone())
        .unwrap_or_default();
    let title = article.title.clone();
    let slug = article.slug.clone();

    let followers: Vec<(Id, Option<_>)> = tables
        .followers_of(article.author_id)
        .into_iter()
        .map(|follower| {
            let email = follower
                .is_subscribed
                .then(|| new_article_email(follower, &author, &title));
            (follower.id, email)
        })
        .collect();

    for (follower_id, email) in &followers {
        tables.notify(
            *follower_id,
            &author,
            Verb::ArticleCreation,
            "An article by an author you follow has been created",
            Some(slug.as_str()),
        );

        if let Some(email) = email {
            mailer.send(email.clone());
        }
    }

    if let Some(article) = tables.articles.get_mut(&article_id) {
        article.announced = true;
    }

    info!("Announced {slug} to {} followers", followers.len());
}

/// Tells the author of `article_id` that `actor` did something to it.
pub fn notify_author(tables: &mut Tables, article_id: Id, actor: Id, verb: Verb) {
    let Some(article) = tables.articles.get(&article_id) else {
        return;
    };
    if article.author_id == actor {
        return;
    }

    let recipient = article.author_id;
    let slug = article.slug.clone();
    let title = article.title.clone();
    let actor = tables
        .user(actor)
        .map(|user| user.username.clone())
        .unwrap_or_default();

    let description = match verb {
        Verb::ArticleCreation => format!("{actor} published \"{title}\""),
        Verb::ArticleLike => format!("{actor} liked your article \"{title}\""),
        Verb::ArticleDislike => format!("{actor} disliked your article \"{title}\""),
        Verb::ArticleFavoriting => format!("{actor} favourited your article \"{title}\""),
    };

    tables.notify(recipient, &actor, verb, description, Some(slug.as_str()));
}
