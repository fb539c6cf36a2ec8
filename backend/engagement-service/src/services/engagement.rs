use event_schema::{CommentAddedData, CommentData, EngagementEvent, LikeToggledData, TipSentData};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngagementConfig;
use crate::domain::{
    Comment, CommentCreated, CounterDrift, LikeState, Money, NewComment, NewTip, Tip, TipInsert,
};
use crate::error::{EngagementError, ServiceResult};
use crate::repository::StoryRepository;
use crate::websocket::Notifier;

pub const DEFAULT_COMMENT_PAGE: i64 = 50;
pub const MAX_COMMENT_PAGE: i64 = 100;

/// Input bounds applied before anything touches the repository
#[derive(Debug, Clone, Copy)]
pub struct EngagementLimits {
    pub max_comment_chars: usize,
    pub max_tip_message_chars: usize,
    pub max_tip_amount: Money,
}

impl Default for EngagementLimits {
    fn default() -> Self {
        Self::from(&EngagementConfig::default())
    }
}

impl From<&EngagementConfig> for EngagementLimits {
    fn from(config: &EngagementConfig) -> Self {
        Self {
            max_comment_chars: config.max_comment_chars,
            max_tip_message_chars: config.max_tip_message_chars,
            max_tip_amount: Money::from_cents(config.max_tip_amount_cents),
        }
    }
}

/// A confirmed payment to be recorded as a tip
#[derive(Debug, Clone)]
pub struct TipRequest {
    pub story_id: Uuid,
    pub amount: Money,
    pub message: Option<String>,
    pub payment_reference: String,
}

/// Validates engagement actions, applies them through the repository and
/// emits exactly one event per successful mutation.
///
/// Events are published only after the repository call returned, which for
/// PostgreSQL means after commit. Failed and duplicate operations emit nothing.
#[derive(Clone)]
pub struct EngagementCoordinator {
    repo: Arc<dyn StoryRepository>,
    notifier: Notifier,
    limits: EngagementLimits,
}

impl EngagementCoordinator {
    pub fn new(repo: Arc<dyn StoryRepository>, notifier: Notifier, limits: EngagementLimits) -> Self {
        Self {
            repo,
            notifier,
            limits,
        }
    }

    pub async fn toggle_like(&self, story_id: Uuid, actor: Option<Uuid>) -> ServiceResult<LikeState> {
        let user_id = actor.ok_or(EngagementError::Auth)?;

        let state = self.repo.toggle_like(story_id, user_id).await?;

        self.notifier.publish(&EngagementEvent::like_toggled(
            story_id,
            LikeToggledData {
                user_id,
                liked: state.liked,
                like_count: state.like_count,
                version: state.version,
            },
        ));

        info!(%story_id, %user_id, liked = state.liked, like_count = state.like_count, "Like toggled");
        Ok(state)
    }

    pub async fn like_status(&self, story_id: Uuid, actor: Option<Uuid>) -> ServiceResult<LikeState> {
        let user_id = actor.ok_or(EngagementError::Auth)?;
        self.repo.like_status(story_id, user_id).await
    }

    pub async fn add_comment(
        &self,
        story_id: Uuid,
        actor: Option<Uuid>,
        content: &str,
        parent_id: Option<Uuid>,
    ) -> ServiceResult<CommentCreated> {
        let user_id = actor.ok_or(EngagementError::Auth)?;

        let content = content.trim();
        if content.is_empty() {
            return Err(EngagementError::Validation(
                "comment cannot be empty".to_string(),
            ));
        }
        let chars = content.chars().count();
        if chars > self.limits.max_comment_chars {
            return Err(EngagementError::Validation(format!(
                "comment is {} characters, maximum is {}",
                chars, self.limits.max_comment_chars
            )));
        }

        let created = self
            .repo
            .insert_comment(NewComment {
                story_id,
                user_id,
                content: content.to_string(),
                parent_id,
            })
            .await?;

        self.notifier.publish(&EngagementEvent::comment_added(
            story_id,
            CommentAddedData {
                comment: comment_data(&created.comment),
                comment_count: created.comment_count,
                version: created.version,
            },
        ));

        info!(%story_id, %user_id, comment_id = %created.comment.id, comment_count = created.comment_count, "Comment added");
        Ok(created)
    }

    pub async fn list_comments(
        &self,
        story_id: Uuid,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ServiceResult<Vec<Comment>> {
        let limit = limit.unwrap_or(DEFAULT_COMMENT_PAGE).clamp(1, MAX_COMMENT_PAGE);
        let offset = offset.unwrap_or(0).max(0);
        self.repo.list_comments(story_id, limit, offset).await
    }

    /// Records a confirmed payment once. A reference seen before is
    /// `DuplicatePayment` (a conflict) and produces no row and no event.
    pub async fn record_tip(&self, actor: Option<Uuid>, request: TipRequest) -> ServiceResult<Tip> {
        let from_user_id = actor.ok_or(EngagementError::Auth)?;

        let payment_reference = request.payment_reference.trim();
        if payment_reference.is_empty() {
            return Err(EngagementError::Validation(
                "payment reference is required".to_string(),
            ));
        }
        if !request.amount.is_positive() {
            return Err(EngagementError::Validation(
                "tip amount must be greater than zero".to_string(),
            ));
        }
        if request.amount > self.limits.max_tip_amount {
            return Err(EngagementError::Validation(format!(
                "tip amount exceeds {}",
                self.limits.max_tip_amount
            )));
        }
        let message = request
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        if let Some(m) = &message {
            if m.chars().count() > self.limits.max_tip_message_chars {
                return Err(EngagementError::Validation(format!(
                    "tip message exceeds {} characters",
                    self.limits.max_tip_message_chars
                )));
            }
        }

        let tip = match self
            .repo
            .insert_tip(NewTip {
                story_id: request.story_id,
                from_user_id,
                amount: request.amount,
                message,
                payment_reference: payment_reference.to_string(),
            })
            .await?
        {
            TipInsert::Created(tip) => tip,
            TipInsert::Duplicate(existing) => {
                warn!(
                    payment_reference,
                    tip_id = %existing.id,
                    "Duplicate payment confirmation ignored"
                );
                return Err(EngagementError::DuplicatePayment(
                    payment_reference.to_string(),
                ));
            }
        };

        self.notifier.publish(&EngagementEvent::tip_sent(
            tip.story_id,
            TipSentData {
                tip_id: tip.id,
                from_user_id: tip.from_user_id,
                to_user_id: tip.to_user_id,
                amount: tip.amount().to_string(),
                message: tip.message.clone(),
                created_at: tip.created_at,
            },
        ));

        info!(story_id = %tip.story_id, tip_id = %tip.id, amount = %tip.amount(), "Tip recorded");
        Ok(tip)
    }

    /// Views are counted but never broadcast
    pub async fn record_view(&self, story_id: Uuid) -> ServiceResult<i64> {
        self.repo.increment_views(story_id).await
    }

    pub async fn reconcile_counters(&self) -> ServiceResult<Vec<CounterDrift>> {
        self.repo.reconcile_counters().await
    }
}

fn comment_data(comment: &Comment) -> CommentData {
    CommentData {
        id: comment.id,
        user_id: comment.user_id,
        content: comment.content.clone(),
        parent_id: comment.parent_id,
        created_at: comment.created_at,
    }
}
