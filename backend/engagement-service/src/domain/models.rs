use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{EngagementError, ServiceResult};

/// Lifecycle of a story. Stories are archived, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "story_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    Draft,
    Published,
    Archived,
}

impl StoryStatus {
    /// Gate for likes, comments, tips and views.
    ///
    /// Drafts are invisible to everyone but the author, so they read as
    /// missing. An archived story was reachable a moment ago; a mutation that
    /// lands after archival is a conflict, not a missing resource.
    pub fn ensure_engageable(self, story_id: Uuid) -> ServiceResult<()> {
        match self {
            StoryStatus::Published => Ok(()),
            StoryStatus::Draft => Err(EngagementError::NotFound(format!("story {}", story_id))),
            StoryStatus::Archived => Err(EngagementError::Conflict(format!(
                "story {} has been archived",
                story_id
            ))),
        }
    }
}

/// Story row, including the denormalized engagement counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub body: String,
    pub status: StoryStatus,
    pub likes: i64,
    pub comments: i64,
    pub views: i64,
    /// Bumped on every counter mutation
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewStory {
    pub author_id: Uuid,
    pub title: String,
    pub body: String,
}

/// Like entity - at most one per (story, user)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub story_id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Comment entity - append-only and immutable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub story_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub story_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub parent_id: Option<Uuid>,
}

/// Tip entity - a financial record, created once per confirmed payment
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Tip {
    pub id: Uuid,
    pub story_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub amount_cents: i64,
    pub payment_reference: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Tip {
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

#[derive(Debug, Clone)]
pub struct NewTip {
    pub story_id: Uuid,
    pub from_user_id: Uuid,
    pub amount: Money,
    pub message: Option<String>,
    pub payment_reference: String,
}

/// Outcome of a tip insert. A duplicate carries the tip recorded first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TipInsert {
    Created(Tip),
    Duplicate(Tip),
}

/// Like state of one (story, user) pair with the authoritative counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
    pub version: i64,
}

/// A freshly appended comment together with the counter it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCreated {
    pub comment: Comment,
    pub comment_count: i64,
    pub version: i64,
}

/// A story whose denormalized counters disagreed with its rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CounterDrift {
    pub story_id: Uuid,
    pub stored_likes: i64,
    pub actual_likes: i64,
    pub stored_comments: i64,
    pub actual_comments: i64,
}

// ============================================================================
// Money
// ============================================================================

/// Currency amount with two decimal places, held as integer minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount {0:?}: expected a decimal with at most two fraction digits")]
pub struct MoneyParseError(pub String);

impl From<MoneyParseError> for EngagementError {
    fn from(err: MoneyParseError) -> Self {
        EngagementError::Validation(err.to_string())
    }
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let err = || MoneyParseError(raw.to_string());
        let s = raw.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if frac.len() > 2
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(err());
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| err())?
        };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse().map_err(|_| err())?,
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(err)?;
        Ok(Money::from_cents(if negative { -cents } else { cents }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_parse() {
        assert_eq!("5".parse::<Money>().unwrap().cents(), 500);
        assert_eq!("5.5".parse::<Money>().unwrap().cents(), 550);
        assert_eq!("5.05".parse::<Money>().unwrap().cents(), 505);
        assert_eq!(".75".parse::<Money>().unwrap().cents(), 75);
        assert_eq!("-1.00".parse::<Money>().unwrap().cents(), -100);
        assert_eq!("0".parse::<Money>().unwrap().cents(), 0);
    }

    #[test]
    fn test_money_rejects_garbage() {
        assert!("".parse::<Money>().is_err());
        assert!(".".parse::<Money>().is_err());
        assert!("1.005".parse::<Money>().is_err());
        assert!("1e3".parse::<Money>().is_err());
        assert!("12,50".parse::<Money>().is_err());
        assert!("99999999999999999999".parse::<Money>().is_err());
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(350).to_string(), "3.50");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-120).to_string(), "-1.20");
    }

    #[test]
    fn test_status_gate() {
        let id = Uuid::new_v4();
        assert!(StoryStatus::Published.ensure_engageable(id).is_ok());
        assert!(matches!(
            StoryStatus::Draft.ensure_engageable(id),
            Err(EngagementError::NotFound(_))
        ));
        assert!(matches!(
            StoryStatus::Archived.ensure_engageable(id),
            Err(EngagementError::Conflict(_))
        ));
    }
}
