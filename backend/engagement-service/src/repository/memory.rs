use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{ensure_readable, StoryRepository};
use crate::domain::{
    Comment, CommentCreated, CounterDrift, LikeState, NewComment, NewStory, NewTip, Story,
    StoryStatus, Tip, TipInsert,
};
use crate::error::{EngagementError, ServiceResult};

/// Story row plus the rows that hang off it
struct StoryRecord {
    story: Story,
    likes: HashMap<Uuid, DateTime<Utc>>,
    comments: Vec<Comment>,
}

impl StoryRecord {
    fn touch(&mut self) {
        self.story.version += 1;
        self.story.updated_at = Utc::now();
    }
}

/// In-process repository used when no database is configured, and in tests.
///
/// One async mutex per story plays the role of the row lock; waiting for it is
/// bounded by the same lock timeout as the PostgreSQL implementation.
pub struct InMemoryStoryRepository {
    stories: RwLock<HashMap<Uuid, Arc<Mutex<StoryRecord>>>>,
    tips: Mutex<HashMap<String, Tip>>,
    lock_timeout: Duration,
}

impl InMemoryStoryRepository {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            stories: RwLock::new(HashMap::new()),
            tips: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    async fn lock(&self, story_id: Uuid) -> ServiceResult<OwnedMutexGuard<StoryRecord>> {
        let record = self
            .stories
            .read()
            .await
            .get(&story_id)
            .cloned()
            .ok_or_else(|| EngagementError::NotFound(format!("story {}", story_id)))?;

        resilience::with_timeout(self.lock_timeout, record.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(%story_id, "Timed out waiting for story lock");
                EngagementError::Busy
            })
    }

    /// Overwrites the stored counters without touching rows
    #[cfg(test)]
    pub(crate) async fn corrupt_counters(&self, story_id: Uuid, likes: i64, comments: i64) {
        if let Ok(mut record) = self.lock(story_id).await {
            record.story.likes = likes;
            record.story.comments = comments;
        }
    }
}

impl Default for InMemoryStoryRepository {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl StoryRepository for InMemoryStoryRepository {
    async fn create_story(&self, new: NewStory) -> ServiceResult<Story> {
        let now = Utc::now();
        let story = Story {
            id: Uuid::new_v4(),
            author_id: new.author_id,
            title: new.title,
            body: new.body,
            status: StoryStatus::Draft,
            likes: 0,
            comments: 0,
            views: 0,
            version: 0,
            created_at: now,
            updated_at: now,
            published_at: None,
        };

        let record = StoryRecord {
            story: story.clone(),
            likes: HashMap::new(),
            comments: Vec::new(),
        };
        self.stories
            .write()
            .await
            .insert(story.id, Arc::new(Mutex::new(record)));

        Ok(story)
    }

    async fn get_story(&self, story_id: Uuid) -> ServiceResult<Option<Story>> {
        match self.lock(story_id).await {
            Ok(record) => Ok(Some(record.story.clone())),
            Err(EngagementError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn transition_status(
        &self,
        story_id: Uuid,
        from: StoryStatus,
        to: StoryStatus,
    ) -> ServiceResult<Story> {
        let mut record = self.lock(story_id).await?;
        if record.story.status != from {
            return Err(EngagementError::Conflict(format!(
                "story {} is {:?}, expected {:?}",
                story_id, record.story.status, from
            )));
        }

        let now = Utc::now();
        record.story.status = to;
        record.story.updated_at = now;
        if to == StoryStatus::Published && record.story.published_at.is_none() {
            record.story.published_at = Some(now);
        }
        Ok(record.story.clone())
    }

    async fn toggle_like(&self, story_id: Uuid, user_id: Uuid) -> ServiceResult<LikeState> {
        let mut record = self.lock(story_id).await?;
        record.story.status.ensure_engageable(story_id)?;

        let liked = if record.likes.remove(&user_id).is_some() {
            record.story.likes = (record.story.likes - 1).max(0);
            false
        } else {
            record.likes.insert(user_id, Utc::now());
            record.story.likes += 1;
            true
        };
        record.touch();

        Ok(LikeState {
            liked,
            like_count: record.story.likes,
            version: record.story.version,
        })
    }

    async fn like_status(&self, story_id: Uuid, user_id: Uuid) -> ServiceResult<LikeState> {
        let record = self.lock(story_id).await?;
        ensure_readable(story_id, record.story.status)?;

        Ok(LikeState {
            liked: record.likes.contains_key(&user_id),
            like_count: record.story.likes,
            version: record.story.version,
        })
    }

    async fn insert_comment(&self, new: NewComment) -> ServiceResult<CommentCreated> {
        let mut record = self.lock(new.story_id).await?;
        record.story.status.ensure_engageable(new.story_id)?;

        if let Some(parent_id) = new.parent_id {
            if !record.comments.iter().any(|c| c.id == parent_id) {
                return Err(EngagementError::Validation(format!(
                    "parent comment {} does not belong to this story",
                    parent_id
                )));
            }
        }

        let comment = Comment {
            id: Uuid::new_v4(),
            story_id: new.story_id,
            user_id: new.user_id,
            content: new.content,
            parent_id: new.parent_id,
            created_at: Utc::now(),
        };
        record.comments.push(comment.clone());
        record.story.comments += 1;
        record.touch();

        Ok(CommentCreated {
            comment,
            comment_count: record.story.comments,
            version: record.story.version,
        })
    }

    async fn list_comments(
        &self,
        story_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<Vec<Comment>> {
        let record = self.lock(story_id).await?;
        ensure_readable(story_id, record.story.status)?;

        Ok(record
            .comments
            .iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_tip(&self, new: NewTip) -> ServiceResult<TipInsert> {
        // Story lock first, then the reference index; both are held until the
        // write so a reference is checked and recorded atomically
        let record = self.lock(new.story_id).await?;
        let mut tips = self.tips.lock().await;
        if let Some(existing) = tips.get(&new.payment_reference) {
            return Ok(TipInsert::Duplicate(existing.clone()));
        }

        record.story.status.ensure_engageable(new.story_id)?;
        if record.story.author_id == new.from_user_id {
            return Err(EngagementError::Validation(
                "cannot tip your own story".to_string(),
            ));
        }

        let tip = Tip {
            id: Uuid::new_v4(),
            story_id: new.story_id,
            from_user_id: new.from_user_id,
            to_user_id: record.story.author_id,
            amount_cents: new.amount.cents(),
            payment_reference: new.payment_reference.clone(),
            message: new.message,
            created_at: Utc::now(),
        };
        tips.insert(new.payment_reference, tip.clone());

        Ok(TipInsert::Created(tip))
    }

    async fn increment_views(&self, story_id: Uuid) -> ServiceResult<i64> {
        let mut record = self.lock(story_id).await?;
        record.story.status.ensure_engageable(story_id)?;
        record.story.views += 1;
        record.story.version += 1;
        Ok(record.story.views)
    }

    async fn reconcile_counters(&self) -> ServiceResult<Vec<CounterDrift>> {
        let ids: Vec<Uuid> = self.stories.read().await.keys().copied().collect();

        let mut repaired = Vec::new();
        for story_id in ids {
            let mut record = self.lock(story_id).await?;
            let drift = CounterDrift {
                story_id,
                stored_likes: record.story.likes,
                actual_likes: record.likes.len() as i64,
                stored_comments: record.story.comments,
                actual_comments: record.comments.len() as i64,
            };
            if drift.stored_likes == drift.actual_likes
                && drift.stored_comments == drift.actual_comments
            {
                continue;
            }

            record.story.likes = drift.actual_likes;
            record.story.comments = drift.actual_comments;
            record.touch();
            tracing::warn!(
                %story_id,
                stored_likes = drift.stored_likes,
                actual_likes = drift.actual_likes,
                stored_comments = drift.stored_comments,
                actual_comments = drift.actual_comments,
                "Repaired counter drift"
            );
            repaired.push(drift);
        }

        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Money;

    async fn published(repo: &InMemoryStoryRepository, author: Uuid) -> Story {
        let story = repo
            .create_story(NewStory {
                author_id: author,
                title: "t".into(),
                body: "b".into(),
            })
            .await
            .unwrap();
        repo.transition_status(story.id, StoryStatus::Draft, StoryStatus::Published)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reconcile_repairs_drift() {
        let repo = InMemoryStoryRepository::default();
        let story = published(&repo, Uuid::new_v4()).await;
        repo.toggle_like(story.id, Uuid::new_v4()).await.unwrap();
        repo.toggle_like(story.id, Uuid::new_v4()).await.unwrap();

        assert!(repo.reconcile_counters().await.unwrap().is_empty());

        repo.corrupt_counters(story.id, 7, 3).await;
        let drift = repo.reconcile_counters().await.unwrap();

        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].stored_likes, 7);
        assert_eq!(drift[0].actual_likes, 2);
        assert_eq!(drift[0].actual_comments, 0);

        let repaired = repo.get_story(story.id).await.unwrap().unwrap();
        assert_eq!(repaired.likes, 2);
        assert_eq!(repaired.comments, 0);
        assert!(repo.reconcile_counters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_held_lock_times_out_as_busy() {
        let repo = InMemoryStoryRepository::new(Duration::from_millis(20));
        let story = published(&repo, Uuid::new_v4()).await;

        let _guard = repo.lock(story.id).await.unwrap();
        let result = repo.toggle_like(story.id, Uuid::new_v4()).await;

        assert!(matches!(result, Err(EngagementError::Busy)));
    }

    fn new_tip(story_id: Uuid, reference: &str) -> NewTip {
        NewTip {
            story_id,
            from_user_id: Uuid::new_v4(),
            amount: Money::from_cents(300),
            message: None,
            payment_reference: reference.into(),
        }
    }

    #[tokio::test]
    async fn test_busy_story_does_not_block_tips_elsewhere() {
        let repo = Arc::new(InMemoryStoryRepository::new(Duration::from_millis(500)));
        let busy = published(&repo, Uuid::new_v4()).await;
        let other = published(&repo, Uuid::new_v4()).await;
        let guard = repo.lock(busy.id).await.unwrap();

        let waiting = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.insert_tip(new_tip(busy.id, "pi_busy")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        let created = repo.insert_tip(new_tip(other.id, "pi_other")).await.unwrap();
        assert!(matches!(created, TipInsert::Created(_)));
        assert!(started.elapsed() < Duration::from_millis(250));

        drop(guard);
        assert!(matches!(
            waiting.await.unwrap().unwrap(),
            TipInsert::Created(_)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_reference_checked_before_status() {
        let repo = InMemoryStoryRepository::default();
        let author = Uuid::new_v4();
        let story = published(&repo, author).await;
        let tip = NewTip {
            story_id: story.id,
            from_user_id: Uuid::new_v4(),
            amount: Money::from_cents(500),
            message: None,
            payment_reference: "pi_1".into(),
        };

        assert!(matches!(
            repo.insert_tip(tip.clone()).await.unwrap(),
            TipInsert::Created(_)
        ));
        repo.transition_status(story.id, StoryStatus::Published, StoryStatus::Archived)
            .await
            .unwrap();

        match repo.insert_tip(tip).await.unwrap() {
            TipInsert::Duplicate(existing) => {
                assert_eq!(existing.to_user_id, author);
                assert_eq!(existing.amount_cents, 500);
            }
            other => panic!("expected duplicate, got {:?}", other),
        }
    }
}
