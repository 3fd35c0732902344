use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Id = u64;

pub const DEFAULT_BIO: &str = "Update your bio description";
pub const MAX_USERNAME_LEN: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    /// `None` for accounts that only ever signed in through a social provider.
    pub password: Option<String>,
    pub bio: String,
    pub image: Option<String>,
    pub is_verified: bool,
    pub is_subscribed: bool,
    pub is_staff: bool,
    pub following: BTreeSet<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Reactions {
    pub likes: BTreeSet<Id>,
    pub dislikes: BTreeSet<Id>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reactions {
    /// Flips `reaction` for `user` and clears the opposite one.
    /// Returns whether the reaction is now set.
    pub fn toggle(&mut self, user: Id, reaction: Reaction) -> bool {
        let (chosen, opposite) = match reaction {
            Reaction::Like => (&mut self.likes, &mut self.dislikes),
            Reaction::Dislike => (&mut self.dislikes, &mut self.likes),
        };

        opposite.remove(&user);

        if chosen.remove(&user) {
            false
        } else {
            chosen.insert(user);
            true
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Article {
    pub id: Id,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub author_id: Id,
    pub image: Option<String>,
    pub published: bool,
    /// Set the first time the article goes public; fan-out happens once.
    pub announced: bool,
    pub tag_ids: Vec<Id>,
    pub reactions: Reactions,
    pub favorited_by: BTreeSet<Id>,
    pub ratings: BTreeMap<Id, u8>,
    pub viewers: BTreeSet<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn average_rating(&self) -> f64 {
        if self.ratings.is_empty() {
            return 0.0;
        }

        let total: u32 = self.ratings.values().map(|&r| r as u32).sum();
        total as f64 / self.ratings.len() as f64
    }

    pub fn is_visible_to(&self, viewer: Option<Id>) -> bool {
        self.published || viewer == Some(self.author_id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub tag: String,
    pub slug: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Comment {
    pub id: Id,
    pub article_id: Id,
    pub author_id: Id,
    pub parent_id: Option<Id>,
    pub body: String,
    pub reactions: Reactions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    ArticleCreation,
    ArticleLike,
    ArticleDislike,
    ArticleFavoriting,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub id: Id,
    pub recipient_id: Id,
    pub actor: String,
    pub verb: Verb,
    pub description: String,
    pub target: Option<String>,
    pub unread: bool,
    pub sent: bool,
    pub deleted: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    Spam,
    Harassment,
    Plagiarism,
    RulesViolation,
}

impl ViolationType {
    pub const ALL: [ViolationType; 4] = [
        ViolationType::Spam,
        ViolationType::Harassment,
        ViolationType::Plagiarism,
        ViolationType::RulesViolation,
    ];

    pub fn value(self) -> &'static str {
        match self {
            ViolationType::Spam => "spam",
            ViolationType::Harassment => "harassment",
            ViolationType::Plagiarism => "plagiarism",
            ViolationType::RulesViolation => "rules_violation",
        }
    }

    pub fn display(self) -> &'static str {
        match self {
            ViolationType::Spam => "Spam",
            ViolationType::Harassment => "Harassment",
            ViolationType::Plagiarism => "Plagiarism",
            ViolationType::RulesViolation => "Rules Violation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.value() == value)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Violation {
    pub id: Id,
    pub reporter_id: Id,
    pub article_id: Id,
    pub kind: ViolationType,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SocialAccount {
    pub provider: String,
    pub uid: String,
    pub user_id: Id,
}

#[cfg(test)]
mod tests {
    use super::{Reaction, Reactions, ViolationType};

    #[test]
    fn test_like_then_dislike_swaps() {
        let mut reactions = Reactions::default();

        assert!(reactions.toggle(7, Reaction::Like));
        assert!(reactions.toggle(7, Reaction::Dislike));
        assert!(!reactions.likes.contains(&7));
        assert!(reactions.dislikes.contains(&7));
    }

    #[test]
    fn test_toggle_twice_clears() {
        let mut reactions = Reactions::default();

        reactions.toggle(1, Reaction::Like);
        assert!(!reactions.toggle(1, Reaction::Like));
        assert!(reactions.likes.is_empty());
    }

    #[test]
    fn test_violation_type_parse() {
        assert_eq!(
            ViolationType::parse("rules_violation"),
            Some(ViolationType::RulesViolation)
        );
        assert_eq!(ViolationType::parse("nonsense"), None);
    }
}
