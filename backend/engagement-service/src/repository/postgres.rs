use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ensure_readable, StoryRepository};
use crate::domain::{
    Comment, CommentCreated, CounterDrift, LikeState, NewComment, NewStory, NewTip, Story,
    StoryStatus, Tip, TipInsert,
};
use crate::error::{EngagementError, ServiceResult};

/// PostgreSQL-backed story repository.
///
/// Each mutation is one transaction that starts with `SET LOCAL lock_timeout`
/// and takes the story row lock with `SELECT ... FOR UPDATE`. A lock wait past
/// the bound surfaces as `EngagementError::Busy`.
#[derive(Clone)]
pub struct PgStoryRepository {
    pool: PgPool,
    lock_timeout_sql: String,
}

impl PgStoryRepository {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self {
            pool,
            lock_timeout_sql: lock_timeout_statement(lock_timeout),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> ServiceResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&self.lock_timeout_sql)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

/// `0ms` would disable the bound, so sub-millisecond values round up to 1ms
fn lock_timeout_statement(lock_timeout: Duration) -> String {
    format!(
        "SET LOCAL lock_timeout = '{}ms'",
        lock_timeout.as_millis().max(1)
    )
}

/// Takes the story row lock, returning its status and author
async fn lock_story(
    tx: &mut Transaction<'_, Postgres>,
    story_id: Uuid,
) -> ServiceResult<(StoryStatus, Uuid)> {
    let row: Option<(StoryStatus, Uuid)> = sqlx::query_as(
        r#"
        SELECT status, author_id
        FROM stories
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(story_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.ok_or_else(|| EngagementError::NotFound(format!("story {}", story_id)))
}

async fn find_tip_by_reference(
    tx: &mut Transaction<'_, Postgres>,
    payment_reference: &str,
) -> ServiceResult<Option<Tip>> {
    let tip = sqlx::query_as::<_, Tip>(
        r#"
        SELECT id, story_id, from_user_id, to_user_id, amount_cents,
               payment_reference, message, created_at
        FROM tips
        WHERE payment_reference = $1
        "#,
    )
    .bind(payment_reference)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(tip)
}

#[async_trait]
impl StoryRepository for PgStoryRepository {
    async fn create_story(&self, new: NewStory) -> ServiceResult<Story> {
        let story = sqlx::query_as::<_, Story>(
            r#"
            INSERT INTO stories (id, author_id, title, body)
            VALUES ($1, $2, $3, $4)
            RETURNING id, author_id, title, body, status, likes, comments, views,
                      version, created_at, updated_at, published_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.author_id)
        .bind(&new.title)
        .bind(&new.body)
        .fetch_one(&self.pool)
        .await?;

        Ok(story)
    }

    async fn get_story(&self, story_id: Uuid) -> ServiceResult<Option<Story>> {
        let story = sqlx::query_as::<_, Story>(
            r#"
            SELECT id, author_id, title, body, status, likes, comments, views,
                   version, created_at, updated_at, published_at
            FROM stories
            WHERE id = $1
            "#,
        )
        .bind(story_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(story)
    }

    async fn transition_status(
        &self,
        story_id: Uuid,
        from: StoryStatus,
        to: StoryStatus,
    ) -> ServiceResult<Story> {
        let mut tx = self.begin().await?;
        let (current, _) = lock_story(&mut tx, story_id).await?;
        if current != from {
            return Err(EngagementError::Conflict(format!(
                "story {} is {:?}, expected {:?}",
                story_id, current, from
            )));
        }

        let published_at = (to == StoryStatus::Published).then(Utc::now);
        let story = sqlx::query_as::<_, Story>(
            r#"
            UPDATE stories
            SET status = $2,
                published_at = COALESCE(published_at, $3),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, author_id, title, body, status, likes, comments, views,
                      version, created_at, updated_at, published_at
            "#,
        )
        .bind(story_id)
        .bind(to)
        .bind(published_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(story)
    }

    async fn toggle_like(&self, story_id: Uuid, user_id: Uuid) -> ServiceResult<LikeState> {
        let mut tx = self.begin().await?;
        let (status, _) = lock_story(&mut tx, story_id).await?;
        status.ensure_engageable(story_id)?;

        let removed = sqlx::query(
            r#"
            DELETE FROM likes
            WHERE story_id = $1 AND user_id = $2
            "#,
        )
        .bind(story_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        let (like_count, version): (i64, i64) = if removed {
            sqlx::query_as(
                r#"
                UPDATE stories
                SET likes = GREATEST(likes - 1, 0),
                    version = version + 1,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING likes, version
                "#,
            )
            .bind(story_id)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query(
                r#"
                INSERT INTO likes (story_id, user_id)
                VALUES ($1, $2)
                "#,
            )
            .bind(story_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query_as(
                r#"
                UPDATE stories
                SET likes = likes + 1,
                    version = version + 1,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING likes, version
                "#,
            )
            .bind(story_id)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await?;

        debug!(%story_id, %user_id, liked = !removed, like_count, "Like toggled");
        Ok(LikeState {
            liked: !removed,
            like_count,
            version,
        })
    }

    async fn like_status(&self, story_id: Uuid, user_id: Uuid) -> ServiceResult<LikeState> {
        let row: Option<(StoryStatus, i64, i64, bool)> = sqlx::query_as(
            r#"
            SELECT s.status, s.likes, s.version,
                   EXISTS(
                       SELECT 1 FROM likes l
                       WHERE l.story_id = s.id AND l.user_id = $2
                   )
            FROM stories s
            WHERE s.id = $1
            "#,
        )
        .bind(story_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let (status, like_count, version, liked) =
            row.ok_or_else(|| EngagementError::NotFound(format!("story {}", story_id)))?;
        ensure_readable(story_id, status)?;

        Ok(LikeState {
            liked,
            like_count,
            version,
        })
    }

    async fn insert_comment(&self, new: NewComment) -> ServiceResult<CommentCreated> {
        let mut tx = self.begin().await?;
        let (status, _) = lock_story(&mut tx, new.story_id).await?;
        status.ensure_engageable(new.story_id)?;

        if let Some(parent_id) = new.parent_id {
            let parent_story: Option<Uuid> =
                sqlx::query_scalar("SELECT story_id FROM comments WHERE id = $1")
                    .bind(parent_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if parent_story != Some(new.story_id) {
                return Err(EngagementError::Validation(format!(
                    "parent comment {} does not belong to this story",
                    parent_id
                )));
            }
        }

        let comment = sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (id, story_id, user_id, content, parent_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, story_id, user_id, content, parent_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.story_id)
        .bind(new.user_id)
        .bind(&new.content)
        .bind(new.parent_id)
        .fetch_one(&mut *tx)
        .await?;

        let (comment_count, version): (i64, i64) = sqlx::query_as(
            r#"
            UPDATE stories
            SET comments = comments + 1,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING comments, version
            "#,
        )
        .bind(new.story_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CommentCreated {
            comment,
            comment_count,
            version,
        })
    }

    async fn list_comments(
        &self,
        story_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<Vec<Comment>> {
        let status: Option<StoryStatus> =
            sqlx::query_scalar("SELECT status FROM stories WHERE id = $1")
                .bind(story_id)
                .fetch_optional(&self.pool)
                .await?;
        let status =
            status.ok_or_else(|| EngagementError::NotFound(format!("story {}", story_id)))?;
        ensure_readable(story_id, status)?;

        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, story_id, user_id, content, parent_id, created_at
            FROM comments
            WHERE story_id = $1
            ORDER BY seq ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(story_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    async fn insert_tip(&self, new: NewTip) -> ServiceResult<TipInsert> {
        let mut tx = self.begin().await?;

        if let Some(existing) = find_tip_by_reference(&mut tx, &new.payment_reference).await? {
            return Ok(TipInsert::Duplicate(existing));
        }

        let (status, author_id) = lock_story(&mut tx, new.story_id).await?;
        status.ensure_engageable(new.story_id)?;
        if author_id == new.from_user_id {
            return Err(EngagementError::Validation(
                "cannot tip your own story".to_string(),
            ));
        }

        let inserted = sqlx::query_as::<_, Tip>(
            r#"
            INSERT INTO tips (id, story_id, from_user_id, to_user_id, amount_cents,
                              payment_reference, message)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (payment_reference) DO NOTHING
            RETURNING id, story_id, from_user_id, to_user_id, amount_cents,
                      payment_reference, message, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.story_id)
        .bind(new.from_user_id)
        .bind(author_id)
        .bind(new.amount.cents())
        .bind(&new.payment_reference)
        .bind(&new.message)
        .fetch_optional(&mut *tx)
        .await?;

        match inserted {
            Some(tip) => {
                tx.commit().await?;
                Ok(TipInsert::Created(tip))
            }
            None => {
                // A concurrent confirmation committed the same reference first
                let existing = find_tip_by_reference(&mut tx, &new.payment_reference)
                    .await?
                    .ok_or_else(|| {
                        EngagementError::Internal(format!(
                            "tip {} conflicted but is not visible",
                            new.payment_reference
                        ))
                    })?;
                Ok(TipInsert::Duplicate(existing))
            }
        }
    }

    async fn increment_views(&self, story_id: Uuid) -> ServiceResult<i64> {
        let mut tx = self.begin().await?;
        let (status, _) = lock_story(&mut tx, story_id).await?;
        status.ensure_engageable(story_id)?;

        let views: i64 = sqlx::query_scalar(
            r#"
            UPDATE stories
            SET views = views + 1,
                version = version + 1
            WHERE id = $1
            RETURNING views
            "#,
        )
        .bind(story_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(views)
    }

    async fn reconcile_counters(&self) -> ServiceResult<Vec<CounterDrift>> {
        let candidates: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT s.id
            FROM stories s
            LEFT JOIN (SELECT story_id, COUNT(*) AS cnt FROM likes GROUP BY story_id) l
                   ON l.story_id = s.id
            LEFT JOIN (SELECT story_id, COUNT(*) AS cnt FROM comments GROUP BY story_id) c
                   ON c.story_id = s.id
            WHERE s.likes <> COALESCE(l.cnt, 0)
               OR s.comments <> COALESCE(c.cnt, 0)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut repaired = Vec::with_capacity(candidates.len());
        for story_id in candidates {
            let mut tx = self.begin().await?;
            lock_story(&mut tx, story_id).await?;

            // Re-read under the row lock; an in-flight mutation may have settled
            let drift = sqlx::query_as::<_, CounterDrift>(
                r#"
                SELECT s.id AS story_id,
                       s.likes AS stored_likes,
                       (SELECT COUNT(*) FROM likes WHERE story_id = s.id) AS actual_likes,
                       s.comments AS stored_comments,
                       (SELECT COUNT(*) FROM comments WHERE story_id = s.id) AS actual_comments
                FROM stories s
                WHERE s.id = $1
                "#,
            )
            .bind(story_id)
            .fetch_one(&mut *tx)
            .await?;

            if drift.stored_likes == drift.actual_likes
                && drift.stored_comments == drift.actual_comments
            {
                continue;
            }

            sqlx::query(
                r#"
                UPDATE stories
                SET likes = $2,
                    comments = $3,
                    version = version + 1,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(story_id)
            .bind(drift.actual_likes)
            .bind(drift.actual_comments)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            warn!(
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
