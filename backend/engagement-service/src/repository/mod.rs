//! Story persistence.
//!
//! The repository is the only writer of the denormalized counter columns.
//! Every mutating call runs under the story's row lock (or the in-memory
//! equivalent), so mutations on one story are linearized and the counter
//! always equals its row count once the call returns.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Comment, CommentCreated, CounterDrift, LikeState, NewComment, NewStory, NewTip, Story,
    StoryStatus, TipInsert,
};
use crate::error::ServiceResult;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStoryRepository;
pub use postgres::PgStoryRepository;

#[async_trait]
pub trait StoryRepository: Send + Sync {
    async fn create_story(&self, new: NewStory) -> ServiceResult<Story>;

    async fn get_story(&self, story_id: Uuid) -> ServiceResult<Option<Story>>;

    /// Moves a story from `from` to `to`. `Conflict` if it is no longer in `from`.
    async fn transition_status(
        &self,
        story_id: Uuid,
        from: StoryStatus,
        to: StoryStatus,
    ) -> ServiceResult<Story>;

    /// Inserts the like if absent, deletes it if present, and adjusts the counter
    async fn toggle_like(&self, story_id: Uuid, user_id: Uuid) -> ServiceResult<LikeState>;

    async fn like_status(&self, story_id: Uuid, user_id: Uuid) -> ServiceResult<LikeState>;

    async fn insert_comment(&self, new: NewComment) -> ServiceResult<CommentCreated>;

    /// Comments in insertion order
    async fn list_comments(
        &self,
        story_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<Vec<Comment>>;

    /// Records a tip exactly once per payment reference
    async fn insert_tip(&self, new: NewTip) -> ServiceResult<TipInsert>;

    async fn increment_views(&self, story_id: Uuid) -> ServiceResult<i64>;

    /// Recomputes like/comment counters from row counts and repairs any drift
    async fn reconcile_counters(&self) -> ServiceResult<Vec<CounterDrift>>;
}

/// Missing or draft stories are not visible to readers
pub(crate) fn ensure_readable(story_id: Uuid, status: StoryStatus) -> ServiceResult<()> {
    match status {
        StoryStatus::Draft => Err(crate::error::EngagementError::NotFound(format!(
            "story {}",
            story_id
        ))),
        StoryStatus::Published | StoryStatus::Archived => Ok(()),
    }
}
