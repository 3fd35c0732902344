//! # Store
//!
//! Relational tables kept in RAM behind one async `RwLock`.
//!
//! ## Tables
//! - users, articles, tags, comments, notifications, violations, social accounts
//! - Each table keys rows by a monotonically increasing id (`next_*_id`), ids start at 1
//! - Many-to-many relations (follows, favourites, reactions, ratings, views) live on the owning row as sets
//!
//! ## Persistence
//! - Optional JSON snapshot (`DATA_PATH`), read once on startup
//! - Every mutating request commits through [`Writer::commit`] before it answers,
//!   so a killed process loses nothing that was acknowledged
//! - Snapshot is written and synced to a sibling temp file first, then renamed over the old one
//!
//! ## Cascades
//! - Deleting an article drops its comments and violation reports
//! - Deleting a comment drops the whole reply thread below it
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use tracing::{debug, info};

use crate::{
    error::AppError,
    models::{
        Article, Comment, DEFAULT_BIO, Id, MAX_USERNAME_LEN, Notification, SocialAccount, Tag, User,
        Verb, Violation,
    },
    utils::{slugify, unique_slug},
};

pub const ARTICLE_NOT_FOUND: &str = "This article does not exist!";
pub const PROFILE_NOT_FOUND: &str = "Profile does not exist.";
pub const COMMENT_NOT_FOUND: &str = "Comment does not exist.";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub users: BTreeMap<Id, User>,
    pub articles: BTreeMap<Id, Article>,
    pub tags: BTreeMap<Id, Tag>,
    pub comments: BTreeMap<Id, Comment>,
    pub notifications: BTreeMap<Id, Notification>,
    pub violations: BTreeMap<Id, Violation>,
    pub social_accounts: Vec<SocialAccount>,
    pub next_user_id: Id,
    pub next_article_id: Id,
    pub next_tag_id: Id,
    pub next_comment_id: Id,
    pub next_notification_id: Id,
    pub next_violation_id: Id,
}

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: Option<String>,
    pub is_verified: bool,
    pub is_staff: bool,
}

pub struct NewArticle {
    pub title: String,
    pub description: String,
    pub body: String,
    pub image: Option<String>,
    pub published: bool,
    pub tags: Vec<String>,
}

/// Tags whose names slugify to nothing (e.g. "C++" or CJK) key on the lowercased name.
fn tag_slug(name: &str) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        name.to_lowercase()
    } else {
        slug
    }
}

fn bump(counter: &mut Id) -> Id {
    *counter += 1;
    *counter
}

impl Tables {
    // users

    pub fn user(&self, id: Id) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
    }

    pub fn user_by_username(&self, username: &str) -> Option<&User> {
        self.users.values().find(|user| user.username == username)
    }

    pub fn profile(&self, username: &str) -> Result<&User, AppError> {
        self.user_by_username(username)
            .ok_or_else(|| AppError::not_found(PROFILE_NOT_FOUND))
    }

    pub fn insert_user(&mut self, new: NewUser) -> &User {
        let id = bump(&mut self.next_user_id);
        let now = Utc::now();

        self.users.entry(id).or_insert(User {
            id,
            username: new.username,
            email: new.email,
            password: new.password,
            bio: DEFAULT_BIO.to_string(),
            image: None,
            is_verified: new.is_verified,
            is_subscribed: true,
            is_staff: new.is_staff,
            following: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn user_mut(&mut self, id: Id) -> Result<&mut User, AppError> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(PROFILE_NOT_FOUND))
    }

    /// Appends a counter to `base` until no user owns it.
    /// `base` is shortened so the result stays within the username limit.
    pub fn free_username(&self, base: &str) -> String {
        let with_suffix = |suffix: &str| {
            let room = MAX_USERNAME_LEN.saturating_sub(suffix.len());
            let mut candidate: String = base.chars().take(room).collect();
            candidate.push_str(suffix);
            candidate
        };

        let first = with_suffix("");
        if self.user_by_username(&first).is_none() {
            return first;
        }

        (2u64..)
            .map(|n| with_suffix(&n.to_string()))
            .find(|candidate| self.user_by_username(candidate).is_none())
            .unwrap_or(first)
    }

    pub fn followers_of(&self, id: Id) -> Vec<&User> {
        self.users
            .values()
            .filter(|user| user.following.contains(&id))
            .collect()
    }

    // articles

    pub fn article_by_slug(&self, slug: &str) -> Result<&Article, AppError> {
        self.articles
            .values()
            .find(|article| article.slug == slug)
            .ok_or_else(|| AppError::not_found(ARTICLE_NOT_FOUND))
    }

    /// Drafts are hidden from everyone but their author.
    pub fn visible_article(&self, slug: &str, viewer: Option<Id>) -> Result<&Article, AppError> {
        self.article_by_slug(slug)
            .ok()
            .filter(|article| article.is_visible_to(viewer))
            .ok_or_else(|| AppError::not_found(ARTICLE_NOT_FOUND))
    }

    pub fn visible_article_mut(
        &mut self,
        slug: &str,
        viewer: Option<Id>,
    ) -> Result<&mut Article, AppError> {
        self.articles
            .values_mut()
            .find(|article| article.slug == slug && article.is_visible_to(viewer))
            .ok_or_else(|| AppError::not_found(ARTICLE_NOT_FOUND))
    }

    pub fn insert_article(&mut self, author_id: Id, new: NewArticle) -> &Article {
        let id = bump(&mut self.next_article_id);
        let slug = unique_slug(&new.title, |candidate| {
            self.articles.values().any(|a| a.slug == candidate)
        });
        let tag_ids = self.resolve_tags(&new.tags);
        let now = Utc::now();

        self.articles.entry(id).or_insert(Article {
            id,
            slug,
            title: new.title,
            description: new.description,
            body: new.body,
            author_id,
            image: new.image,
            published: new.published,
            announced: false,
            tag_ids,
            reactions: Default::default(),
            favorited_by: BTreeSet::new(),
            ratings: BTreeMap::new(),
            viewers: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn delete_article(&mut self, id: Id) {
        self.articles.remove(&id);
        self.comments.retain(|_, comment| comment.article_id != id);
        self.violations.retain(|_, violation| violation.article_id != id);
    }

    // tags

    pub fn tag_by_slug(&self, slug: &str) -> Option<&Tag> {
        self.tags.values().find(|tag| tag.slug == slug)
    }

    /// Tag stored under the same key `get_or_create_tag` would use for `name`.
    pub fn find_tag(&self, name: &str) -> Option<&Tag> {
        self.tag_by_slug(&tag_slug(name.trim()))
    }

    /// Get-or-create by slug, so "Rust" and "rust" share one tag.
    pub fn get_or_create_tag(&mut self, name: &str) -> Id {
        let name = name.trim();
        let slug = tag_slug(name);

        if let Some(tag) = self.tag_by_slug(&slug) {
            return tag.id;
        }

        let id = bump(&mut self.next_tag_id);
        self.tags.insert(
            id,
            Tag {
                id,
                tag: name.to_string(),
                slug,
            },
        );

        id
    }

    /// Tag ids for `names`, deduplicated, first occurrence wins.
    pub fn resolve_tags(&mut self, names: &[String]) -> Vec<Id> {
        let mut ids = Vec::with_capacity(names.len());

        for name in names {
            let id = self.get_or_create_tag(name);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        ids
    }

    pub fn tag_names(&self, article: &Article) -> Vec<String> {
        article
            .tag_ids
            .iter()
            .filter_map(|id| self.tags.get(id))
            .map(|tag| tag.tag.clone())
            .collect()
    }

    // comments

    pub fn comment_on(&self, article_id: Id, comment_id: Id) -> Result<&Comment, AppError> {
        self.comments
            .get(&comment_id)
            .filter(|comment| comment.article_id == article_id)
            .ok_or_else(|| AppError::not_found(COMMENT_NOT_FOUND))
    }

    pub fn comment_on_mut(
        &mut self,
        article_id: Id,
        comment_id: Id,
    ) -> Result<&mut Comment, AppError> {
        self.comments
            .get_mut(&comment_id)
            .filter(|comment| comment.article_id == article_id)
            .ok_or_else(|| AppError::not_found(COMMENT_NOT_FOUND))
    }

    pub fn insert_comment(
        &mut self,
        article_id: Id,
        author_id: Id,
        parent_id: Option<Id>,
        body: String,
    ) -> &Comment {
        let id = bump(&mut self.next_comment_id);
        let now = Utc::now();

        self.comments.entry(id).or_insert(Comment {
            id,
            article_id,
            author_id,
            parent_id,
            body,
            reactions: Default::default(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn replies_to(&self, parent_id: Id) -> Vec<&Comment> {
        self.comments
            .values()
            .filter(|comment| comment.parent_id == Some(parent_id))
            .collect()
    }

    pub fn top_level_comments(&self, article_id: Id) -> Vec<&Comment> {
        self.comments
            .values()
            .filter(|comment| comment.article_id == article_id && comment.parent_id.is_none())
            .collect()
    }

    pub fn comment_count(&self, article_id: Id) -> usize {
        self.comments
            .values()
            .filter(|comment| comment.article_id == article_id)
            .count()
    }

    /// Removes `id` and every reply below it.
    pub fn delete_thread(&mut self, id: Id) {
        let mut pending = vec![id];

        while let Some(current) = pending.pop() {
            self.comments.remove(&current);
            pending.extend(
                self.comments
                    .values()
                    .filter(|comment| comment.parent_id == Some(current))
                    .map(|comment| comment.id),
            );
        }
    }

    // notifications

    pub fn notify(
        &mut self,
        recipient_id: Id,
        actor: &str,
        verb: Verb,
        description: impl Into<String>,
        target: Option<&str>,
    ) -> Id {
        let id = bump(&mut self.next_notification_id);

        self.notifications.insert(
            id,
            Notification {
                id,
                recipient_id,
                actor: actor.to_string(),
                verb,
                description: description.into(),
                target: target.map(str::to_string),
                unread: true,
                sent: false,
                deleted: false,
                timestamp: Utc::now(),
            },
        );

        id
    }

    // violations

    pub fn insert_violation(&mut self, violation: impl FnOnce(Id) -> Violation) -> &Violation {
        let id = bump(&mut self.next_violation_id);

        self.violations.entry(id).or_insert(violation(id))
    }

    // social accounts

    pub fn social_user(&self, provider: &str, uid: &str) -> Option<Id> {
        self.social_accounts
            .iter()
            .find(|account| account.provider == provider && account.uid == uid)
            .map(|account| account.user_id)
    }

    pub fn link_social(&mut self, provider: &str, uid: &str, user_id: Id) {
        if self.social_user(provider, uid).is_none() {
            self.social_accounts.push(SocialAccount {
                provider: provider.to_string(),
                uid: uid.to_string(),
                user_id,
            });
        }
    }
}

pub struct Database {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
}

/// Exclusive access to the tables. Changes reach the snapshot on [`Writer::commit`].
pub struct Writer<'a> {
    tables: RwLockWriteGuard<'a, Tables>,
    path: Option<&'a Path>,
}

impl Deref for Writer<'_> {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        &self.tables
    }
}

impl DerefMut for Writer<'_> {
    fn deref_mut(&mut self) -> &mut Tables {
        &mut self.tables
    }
}

impl Writer<'_> {
    /// Writes the tables through to the snapshot while the lock is still held,
    /// so snapshots land in the same order as the mutations.
    pub async fn commit(&self) -> Result<(), AppError> {
        match self.path {
            Some(path) => persist(path, &self.tables).await,
            None => Ok(()),
        }
    }
}

async fn persist(path: &Path, tables: &Tables) -> Result<(), AppError> {
    let data = serde_json::to_vec(tables)?;

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");

    let mut file = File::create(&temp).await?;
    file.write_all(&data).await?;
    file.sync_all().await?;
    fs::rename(&temp, path).await?;

    debug!("Snapshot written to {} ({} bytes)", path.display(), data.len());
    Ok(())
}

impl Database {
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            path: None,
        }
    }

    pub async fn open(path: &Path) -> Result<Self, AppError> {
        let tables = if fs::try_exists(path).await? {
            let data = fs::read(path).await?;
            let tables: Tables = serde_json::from_slice(&data)?;

            info!(
                "Loaded snapshot {}: {} users, {} articles",
                path.display(),
                tables.users.len(),
                tables.articles.len()
            );

            tables
        } else {
            info!("No snapshot at {}, starting empty", path.display());
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path.to_path_buf()),
        })
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().await
    }

    pub async fn write(&self) -> Writer<'_> {
        Writer {
            tables: self.tables.write().await,
            path: self.path.as_deref(),
        }
    }

    /// Final flush on shutdown.
    pub async fn save(&self) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        persist(path, &*self.tables.read().await).await?;

        info!("Snapshot flushed to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Reaction, ViolationType};

    fn user(tables: &mut Tables, name: &str) -> Id {
        tables
            .insert_user(NewUser {
                username: name.to_string(),
                email: format!("{name}@authors.io"),
                password: None,
                is_verified: true,
                is_staff: false,
            })
            .id
    }

    fn article(tables: &mut Tables, author: Id, title: &str, tags: &[&str]) -> Id {
        tables
            .insert_article(
                author,
                NewArticle {
                    title: title.to_string(),
                    description: "description".to_string(),
                    body: "body".to_string(),
                    image: None,
                    published: true,
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                },
            )
            .id
    }

    #[test]
    fn test_ids_start_at_one() {
        let mut tables = Tables::default();

        assert_eq!(user(&mut tables, "bev"), 1);
        assert_eq!(user(&mut tables, "moses"), 2);
    }

    #[test]
    fn test_email_lookup_ignores_case() {
        let mut tables = Tables::default();
        user(&mut tables, "bev");

        assert!(tables.user_by_email("BEV@authors.io").is_some());
    }

    #[test]
    fn test_slug_collision() {
        let mut tables = Tables::default();
        let author = user(&mut tables, "bev");

        let first = article(&mut tables, author, "Same title", &[]);
        let second = article(&mut tables, author, "Same title", &[]);

        assert_eq!(tables.articles[&first].slug, "same-title");
        assert_eq!(tables.articles[&second].slug, "same-title-2");
    }

    #[test]
    fn test_tags_are_not_duplicated() {
        let mut tables = Tables::default();
        let author = user(&mut tables, "bev");

        let id = article(&mut tables, author, "Tagged", &["Django", "django", "Rust"]);
        tables.get_or_create_tag("Django");

        assert_eq!(tables.tags.len(), 2);
        assert_eq!(tables.tag_names(&tables.articles[&id]), vec!["Django", "Rust"]);
    }

    #[test]
    fn test_find_tag_matches_by_slug() {
        let mut tables = Tables::default();
        let id = tables.get_or_create_tag("Rust-Lang");

        assert_eq!(tables.find_tag("rust lang").map(|t| t.id), Some(id));
        assert_eq!(tables.find_tag("RUST_LANG").map(|t| t.id), None);
        assert!(tables.find_tag("go").is_none());
    }

    #[test]
    fn test_drafts_hidden_from_others() {
        let mut tables = Tables::default();
        let author = user(&mut tables, "bev");
        let other = user(&mut tables, "moses");
        let id = article(&mut tables, author, "Draft", &[]);
        tables.articles.get_mut(&id).unwrap().published = false;

        assert!(tables.visible_article("draft", Some(author)).is_ok());
        assert!(tables.visible_article("draft", Some(other)).is_err());
        assert!(tables.visible_article("draft", None).is_err());
    }

    #[test]
    fn test_delete_thread() {
        let mut tables = Tables::default();
        let author = user(&mut tables, "bev");
        let article_id = article(&mut tables, author, "Thread", &[]);

        let root = tables.insert_comment(article_id, author, None, "root".into()).id;
        let reply = tables
            .insert_comment(article_id, author, Some(root), "reply".into())
            .id;
        tables.insert_comment(article_id, author, Some(reply), "nested".into());
        let other = tables.insert_comment(article_id, author, None, "other".into()).id;

        tables.delete_thread(root);

        assert_eq!(tables.comments.len(), 1);
        assert!(tables.comments.contains_key(&other));
    }

    #[test]
    fn test_delete_article_cascades() {
        let mut tables = Tables::default();
        let author = user(&mut tables, "bev");
        let reader = user(&mut tables, "moses");
        let id = article(&mut tables, author, "Gone", &[]);

        tables.insert_comment(id, reader, None, "hi".into());
        tables.insert_violation(|vid| Violation {
            id: vid,
            reporter_id: reader,
            article_id: id,
            kind: ViolationType::Spam,
            description: "spam".into(),
            created_at: Utc::now(),
        });

        tables.delete_article(id);

        assert!(tables.articles.is_empty());
        assert!(tables.comments.is_empty());
        assert!(tables.violations.is_empty());
    }

    #[test]
    fn test_followers_of() {
        let mut tables = Tables::default();
        let author = user(&mut tables, "bev");
        let fan = user(&mut tables, "moses");
        user(&mut tables, "stranger");
        tables.user_mut(fan).unwrap().following.insert(author);

        let followers: Vec<_> = tables
            .followers_of(author)
            .iter()
            .map(|u| u.username.clone())
            .collect();

        assert_eq!(followers, vec!["moses"]);
    }

    #[test]
    fn test_free_username() {
        let mut tables = Tables::default();
        user(&mut tables, "bev");
        user(&mut tables, "bev2");

        assert_eq!(tables.free_username("bev"), "bev3");
        assert_eq!(tables.free_username("moses"), "moses");
    }

    #[test]
    fn test_free_username_stays_within_limit() {
        let mut tables = Tables::default();
        let long = "a".repeat(MAX_USERNAME_LEN + 10);
        user(&mut tables, &"a".repeat(MAX_USERNAME_LEN));

        let free = tables.free_username(&long);
        assert_eq!(free.len(), MAX_USERNAME_LEN);
        assert!(free.ends_with('2'));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authors.json");

        let db = Database::open(&path).await.unwrap();
        {
            let mut tables = db.write().await;
            let author = user(&mut tables, "bev");
            let id = article(&mut tables, author, "Persisted", &["rust"]);
            tables
                .articles
                .get_mut(&id)
                .unwrap()
                .reactions
                .toggle(author, Reaction::Like);
        }
        db.save().await.unwrap();

        let reopened = Database::open(&path).await.unwrap();
        let tables = reopened.read().await;

        assert_eq!(tables.users.len(), 1);
        assert_eq!(tables.next_article_id, 1);
        let article = tables.article_by_slug("persisted").unwrap();
        assert_eq!(article.reactions.likes.len(), 1);
        assert_eq!(tables.tag_names(article), vec!["rust"]);
    }

    #[tokio::test]
    async fn test_commit_survives_without_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authors.json");

        let db = Database::open(&path).await.unwrap();
        {
            let mut tables = db.write().await;
            user(&mut tables, "bev");
            tables.commit().await.unwrap();
        }
        drop(db);

        let reopened = Database::open(&path).await.unwrap();
        let tables = reopened.read().await;

        assert_eq!(tables.users.len(), 1);
        assert_eq!(tables.next_user_id, 1);
    }

    #[tokio::test]
    async fn test_commit_without_path_is_noop() {
        let db = Database::in_memory();
        let mut tables = db.write().await;
        user(&mut tables, "bev");

        assert!(tables.commit().await.is_ok());
    }
}
