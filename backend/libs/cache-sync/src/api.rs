use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// Like state as returned by the toggle and status endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeSnapshot {
    pub liked: bool,
    pub like_count: i64,
    pub version: i64,
}

/// The stored comment as echoed back; fields beyond the id are not needed here
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckedComment {
    pub id: Uuid,
}

/// Acknowledgement of a stored comment: `{comment: {id, ...}, commentCount, version}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAck {
    pub comment: AckedComment,
    pub comment_count: i64,
    pub version: i64,
}

/// Transport to the engagement service, authenticated as the cache's viewer
#[async_trait]
pub trait EngagementApi: Send + Sync {
    async fn toggle_like(&self, story_id: Uuid) -> Result<LikeSnapshot, ApiError>;

    async fn like_status(&self, story_id: Uuid) -> Result<LikeSnapshot, ApiError>;

    async fn add_comment(&self, story_id: Uuid, content: &str) -> Result<CommentAck, ApiError>;
}

#[async_trait]
impl<T: EngagementApi + ?Sized> EngagementApi for std::sync::Arc<T> {
    async fn toggle_like(&self, story_id: Uuid) -> Result<LikeSnapshot, ApiError> {
        (**self).toggle_like(story_id).await
    }

    async fn like_status(&self, story_id: Uuid) -> Result<LikeSnapshot, ApiError> {
        (**self).like_status(story_id).await
    }

    async fn add_comment(&self, story_id: Uuid, content: &str) -> Result<CommentAck, ApiError> {
        (**self).add_comment(story_id, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_comment_ack_decodes_service_response() {
        let comment_id = Uuid::new_v4();
        let body = json!({
            "comment": {
                "id": comment_id,
                "storyId": Uuid::new_v4(),
                "userId": Uuid::new_v4(),
                "content": "This stayed with me.",
                "parentId": null,
                "createdAt": "2026-01-01T00:00:00Z"
            },
            "commentCount": 3,
            "version": 12
        });

        let ack: CommentAck = serde_json::from_value(body).unwrap();
        assert_eq!(ack.comment.id, comment_id);
        assert_eq!(ack.comment_count, 3);
        assert_eq!(ack.version, 12);
    }

    #[test]
    fn test_like_snapshot_decodes_service_response() {
        let body = json!({ "liked": true, "likeCount": 4, "version": 7 });

        let snapshot: LikeSnapshot = serde_json::from_value(body).unwrap();
        assert_eq!(
            snapshot,
            LikeSnapshot {
                liked: true,
                like_count: 4,
                version: 7
            }
        );
    }
}
