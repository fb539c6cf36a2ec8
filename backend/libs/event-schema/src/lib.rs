//! Event schema for engagement notifications pushed to story rooms
//!
//! Every event travels as a single JSON object of shape
//! `{type, storyId, data}` plus envelope metadata (`eventId`, `timestamp`,
//! `schemaVersion`). Browser clients and the cache synchronizer both
//! deserialize this exact shape.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for all engagement events
pub const SCHEMA_VERSION: u32 = 1;

/// Discriminant of an engagement event, as it appears in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementEventType {
    LikeToggled,
    CommentAdded,
    TipSent,
}

impl EngagementEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementEventType::LikeToggled => "like_toggled",
            EngagementEventType::CommentAdded => "comment_added",
            EngagementEventType::TipSent => "tip_sent",
        }
    }
}

impl std::fmt::Display for EngagementEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggledData {
    pub user_id: Uuid,
    pub liked: bool,
    /// Authoritative counter after the toggle committed
    pub like_count: i64,
    /// Story counter version after the toggle committed
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentData {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAddedData {
    pub comment: CommentData,
    pub comment_count: i64,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipSentData {
    pub tip_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    /// Decimal amount with exactly two fraction digits, e.g. "3.50"
    pub amount: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Typed payload; serialized adjacently as `{"type": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngagementPayload {
    LikeToggled(LikeToggledData),
    CommentAdded(CommentAddedData),
    TipSent(TipSentData),
}

impl EngagementPayload {
    pub fn event_type(&self) -> EngagementEventType {
        match self {
            EngagementPayload::LikeToggled(_) => EngagementEventType::LikeToggled,
            EngagementPayload::CommentAdded(_) => EngagementEventType::CommentAdded,
            EngagementPayload::TipSent(_) => EngagementEventType::TipSent,
        }
    }
}

// ============================================================================
// EVENT
// ============================================================================

/// A transient notification describing one committed engagement mutation.
///
/// Lives for the duration of one broadcast; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementEvent {
    /// Unique event ID, lets clients drop duplicates
    pub event_id: Uuid,
    pub story_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub schema_version: u32,
    #[serde(flatten)]
    pub payload: EngagementPayload,
}

impl EngagementEvent {
    pub fn new(story_id: Uuid, payload: EngagementPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            story_id,
            timestamp: Utc::now(),
            schema_version: SCHEMA_VERSION,
            payload,
        }
    }

    pub fn like_toggled(story_id: Uuid, data: LikeToggledData) -> Self {
        Self::new(story_id, EngagementPayload::LikeToggled(data))
    }

    pub fn comment_added(story_id: Uuid, data: CommentAddedData) -> Self {
        Self::new(story_id, EngagementPayload::CommentAdded(data))
    }

    pub fn tip_sent(story_id: Uuid, data: TipSentData) -> Self {
        Self::new(story_id, EngagementPayload::TipSent(data))
    }

    pub fn event_type(&self) -> EngagementEventType {
        self.payload.event_type()
    }

    /// Counter version carried by the payload, if the event changed counters
    pub fn counter_version(&self) -> Option<i64> {
        match &self.payload {
            EngagementPayload::LikeToggled(d) => Some(d.version),
            EngagementPayload::CommentAdded(d) => Some(d.version),
            EngagementPayload::TipSent(_) => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
