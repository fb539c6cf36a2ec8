use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{NewStory, Story, StoryStatus};
use crate::error::{EngagementError, ServiceResult};
use crate::repository::StoryRepository;

const MAX_TITLE_CHARS: usize = 200;

/// Story lifecycle: draft → published → archived. Only the author moves a story.
#[derive(Clone)]
pub struct StoryService {
    repo: Arc<dyn StoryRepository>,
}

impl StoryService {
    pub fn new(repo: Arc<dyn StoryRepository>) -> Self {
        Self { repo }
    }

    pub async fn create_story(
        &self,
        actor: Option<Uuid>,
        title: &str,
        body: &str,
    ) -> ServiceResult<Story> {
        let author_id = actor.ok_or(EngagementError::Auth)?;

        let title = title.trim();
        if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
            return Err(EngagementError::Validation(format!(
                "title must be 1-{} characters",
                MAX_TITLE_CHARS
            )));
        }
        if body.trim().is_empty() {
            return Err(EngagementError::Validation(
                "story body cannot be empty".to_string(),
            ));
        }

        let story = self
            .repo
            .create_story(NewStory {
                author_id,
                title: title.to_string(),
                body: body.to_string(),
            })
            .await?;

        info!(story_id = %story.id, %author_id, "Story drafted");
        Ok(story)
    }

    /// Drafts are visible to their author only
    pub async fn get_story(&self, actor: Option<Uuid>, story_id: Uuid) -> ServiceResult<Story> {
        match self.repo.get_story(story_id).await? {
            Some(story) if story.status != StoryStatus::Draft => Ok(story),
            Some(story) if Some(story.author_id) == actor => Ok(story),
            _ => Err(EngagementError::NotFound(format!("story {}", story_id))),
        }
    }

    pub async fn publish_story(&self, actor: Option<Uuid>, story_id: Uuid) -> ServiceResult<Story> {
        self.transition(actor, story_id, StoryStatus::Draft, StoryStatus::Published)
            .await
    }

    pub async fn archive_story(&self, actor: Option<Uuid>, story_id: Uuid) -> ServiceResult<Story> {
        self.transition(actor, story_id, StoryStatus::Published, StoryStatus::Archived)
            .await
    }

    async fn transition(
        &self,
        actor: Option<Uuid>,
        story_id: Uuid,
        from: StoryStatus,
        to: StoryStatus,
    ) -> ServiceResult<Story> {
        let user_id = actor.ok_or(EngagementError::Auth)?;
        let story = self.get_story(Some(user_id), story_id).await?;
        if story.author_id != user_id {
            return Err(EngagementError::Forbidden(
                "only the author can change a story's status".to_string(),
            ));
        }

        let story = self.repo.transition_status(story_id, from, to).await?;
        info!(%story_id, status = ?story.status, "Story status changed");
        Ok(story)
    }
}
