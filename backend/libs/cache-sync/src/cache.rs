use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use event_schema::{EngagementEvent, EngagementPayload};
use resilience::{with_deadline, with_retry, RetryConfig, Transient};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::{EngagementApi, LikeSnapshot};
use crate::error::{ApiError, Notice};
use crate::mutation::{MutationKind, MutationState, PendingMutation, Snapshot};

/// Event ids remembered for duplicate suppression
const SEEN_EVENTS_CAPACITY: usize = 1024;

/// Counters rendered for one story
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryView {
    pub liked: bool,
    pub like_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone)]
pub struct SyncPolicy {
    pub retry: RetryConfig,
    /// Deadline for a single round-trip
    pub request_timeout: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a user action. `Idle` means the action was not started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    pub state: MutationState,
    pub view: StoryView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    /// Held until the in-flight mutation settles
    Queued,
    /// Older than what the cache already shows
    Stale,
    Duplicate,
    /// Story not cached, or the event carries no counters
    Ignored,
}

#[derive(Debug, Default)]
struct Entry {
    view: StoryView,
    like_version: i64,
    comment_version: i64,
    pending: Option<PendingMutation>,
    queued: Vec<EngagementEvent>,
}

impl Entry {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            liked: self.view.liked,
            like_count: self.view.like_count,
            comment_count: self.view.comment_count,
        }
    }

    fn restore(&mut self, before: Snapshot) {
        self.view.liked = before.liked;
        self.view.like_count = before.like_count;
        self.view.comment_count = before.comment_count;
    }

    fn apply_event(&mut self, event: &EngagementEvent, viewer_id: Uuid) -> EventOutcome {
        match &event.payload {
            EngagementPayload::LikeToggled(data) => {
                if data.version <= self.like_version {
                    return EventOutcome::Stale;
                }
                self.view.like_count = data.like_count;
                if data.user_id == viewer_id {
                    self.view.liked = data.liked;
                }
                self.like_version = data.version;
                EventOutcome::Applied
            }
            EngagementPayload::CommentAdded(data) => {
                if data.version <= self.comment_version {
                    return EventOutcome::Stale;
                }
                self.view.comment_count = data.comment_count;
                self.comment_version = data.version;
                EventOutcome::Applied
            }
            EngagementPayload::TipSent(_) => EventOutcome::Ignored,
        }
    }

    /// Applies everything that arrived while a mutation was in flight
    fn drain_queue(&mut self, viewer_id: Uuid) {
        for event in std::mem::take(&mut self.queued) {
            let outcome = self.apply_event(&event, viewer_id);
            debug!(event_id = %event.event_id, ?outcome, "Applied queued event");
        }
    }
}

/// A failed attempt. Mutations are repeated only when the server applied
/// nothing; reads are repeated on any server-side failure.
#[derive(Debug)]
struct Attempt {
    error: ApiError,
    idempotent: bool,
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl Transient for Attempt {
    fn is_transient(&self) -> bool {
        if self.idempotent {
            self.error.is_transient()
        } else {
            self.error.is_safe_to_replay()
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    stories: HashMap<Uuid, Entry>,
    seen: HashSet<Uuid>,
    seen_order: VecDeque<Uuid>,
    notices: Vec<Notice>,
    next_mutation_id: u64,
}

impl Inner {
    /// Returns false if the event was already seen
    fn remember(&mut self, event_id: Uuid) -> bool {
        if !self.seen.insert(event_id) {
            return false;
        }
        self.seen_order.push_back(event_id);
        if self.seen_order.len() > SEEN_EVENTS_CAPACITY {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

/// Engagement state of the stories a viewer has open.
///
/// At most one mutation per story is in flight; a second press while one is
/// pending is ignored. Pushed events for a story with a pending mutation are
/// queued and merged, in arrival order, once it settles.
pub struct StoryCache<A> {
    api: A,
    viewer_id: Uuid,
    policy: SyncPolicy,
    inner: Mutex<Inner>,
}

impl<A: EngagementApi> StoryCache<A> {
    pub fn new(api: A, viewer_id: Uuid) -> Self {
        Self::with_policy(api, viewer_id, SyncPolicy::default())
    }

    pub fn with_policy(api: A, viewer_id: Uuid, policy: SyncPolicy) -> Self {
        Self {
            api,
            viewer_id,
            policy,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Loads the counters fetched with the story page
    pub async fn seed(&self, story_id: Uuid, view: StoryView, version: i64) {
        let mut inner = self.inner.lock().await;
        let entry = inner.stories.entry(story_id).or_default();
        entry.view = view;
        entry.like_version = version;
        entry.comment_version = version;
    }

    /// Drops a story once its screen is closed
    pub async fn forget(&self, story_id: Uuid) {
        self.inner.lock().await.stories.remove(&story_id);
    }

    pub async fn view(&self, story_id: Uuid) -> Option<StoryView> {
        self.inner.lock().await.stories.get(&story_id).map(|e| e.view)
    }

    pub async fn is_pending(&self, story_id: Uuid) -> bool {
        self.inner
            .lock()
            .await
            .stories
            .get(&story_id)
            .map(|e| e.pending.is_some())
            .unwrap_or(false)
    }

    /// Notices raised since the last call
    pub async fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.inner.lock().await.notices)
    }

    /// Heart tapped: flip locally, then confirm or revert.
    ///
    /// The toggle itself is never resent once it may have reached the server.
    /// When its outcome is unknown the like state is read back instead.
    pub async fn like_pressed(&self, story_id: Uuid) -> MutationOutcome {
        let started = self
            .begin(story_id, MutationKind::ToggleLike, |view| {
                view.liked = !view.liked;
                view.like_count = if view.liked {
                    view.like_count + 1
                } else {
                    (view.like_count - 1).max(0)
                };
            })
            .await;
        let intended = match started {
            Ok(view) => view.liked,
            Err(outcome) => return outcome,
        };

        let result = match self.call(false, || self.api.toggle_like(story_id)).await {
            Err(ApiError::Timeout) | Err(ApiError::Server(_)) => {
                self.read_back_like(story_id, intended).await
            }
            other => other,
        };

        self.settle(story_id, result, |entry, snapshot| {
            entry.view.liked = snapshot.liked;
            entry.view.like_count = snapshot.like_count;
            entry.like_version = entry.like_version.max(snapshot.version);
        })
        .await
    }

    /// Comment sent: count it locally, then confirm or revert.
    ///
    /// A comment whose outcome is unknown is rolled back, never resent; if the
    /// server did store it, its `comment_added` event restores the count.
    pub async fn comment_submitted(&self, story_id: Uuid, content: &str) -> MutationOutcome {
        if content.trim().is_empty() {
            let mut inner = self.inner.lock().await;
            inner
                .notices
                .push(Notice::InlineError("comment cannot be empty".to_string()));
            let view = inner.stories.get(&story_id).map(|e| e.view).unwrap_or_default();
            return MutationOutcome {
                state: MutationState::Idle,
                view,
            };
        }

        let started = self
            .begin(story_id, MutationKind::AddComment, |view| {
                view.comment_count += 1;
            })
            .await;
        if let Err(outcome) = started {
            return outcome;
        }

        let result = self
            .call(false, || self.api.add_comment(story_id, content))
            .await;

        self.settle(story_id, result, |entry, ack| {
            entry.view.comment_count = ack.comment_count;
            entry.comment_version = entry.comment_version.max(ack.version);
        })
        .await
    }

    /// Merges a pushed engagement event
    pub async fn apply_event(&self, event: &EngagementEvent) -> EventOutcome {
        let mut inner = self.inner.lock().await;
        if !inner.remember(event.event_id) {
            return EventOutcome::Duplicate;
        }

        let Some(entry) = inner.stories.get_mut(&event.story_id) else {
            return EventOutcome::Ignored;
        };
        if entry.pending.is_some() {
            entry.queued.push(event.clone());
            return EventOutcome::Queued;
        }
        entry.apply_event(event, self.viewer_id)
    }

    /// Re-reads the like state, e.g. after the event stream reconnects.
    /// Skipped while a mutation on the story is in flight.
    pub async fn refresh(&self, story_id: Uuid) -> Result<StoryView, ApiError> {
        if self.is_pending(story_id).await {
            return Ok(self.view(story_id).await.unwrap_or_default());
        }

        let snapshot = self.call(true, || self.api.like_status(story_id)).await?;

        let mut inner = self.inner.lock().await;
        let entry = inner.stories.entry(story_id).or_default();
        if entry.pending.is_none() && snapshot.version >= entry.like_version {
            entry.view.liked = snapshot.liked;
            entry.view.like_count = snapshot.like_count;
            entry.like_version = snapshot.version;
        }
        Ok(entry.view)
    }

    async fn begin(
        &self,
        story_id: Uuid,
        kind: MutationKind,
        optimistic: impl FnOnce(&mut StoryView),
    ) -> Result<StoryView, MutationOutcome> {
        let mut inner = self.inner.lock().await;
        inner.next_mutation_id += 1;
        let id = inner.next_mutation_id;

        let entry = inner.stories.entry(story_id).or_default();
        if entry.pending.is_some() {
            debug!(%story_id, ?kind, "Mutation already in flight, ignoring");
            return Err(MutationOutcome {
                state: MutationState::Idle,
                view: entry.view,
            });
        }

        let mut mutation = PendingMutation::new(id, story_id, kind);
        mutation.apply(entry.snapshot());
        optimistic(&mut entry.view);
        entry.pending = Some(mutation);
        Ok(entry.view)
    }

    /// Confirms a toggle only if the server now holds the state the viewer asked for
    async fn read_back_like(
        &self,
        story_id: Uuid,
        intended: bool,
    ) -> Result<LikeSnapshot, ApiError> {
        warn!(%story_id, "Like toggle outcome unknown, reading back server state");
        let snapshot = self.call(true, || self.api.like_status(story_id)).await?;
        if snapshot.liked == intended {
            Ok(snapshot)
        } else {
            Err(ApiError::Timeout)
        }
    }

    async fn settle<T>(
        &self,
        story_id: Uuid,
        result: Result<T, ApiError>,
        confirm: impl FnOnce(&mut Entry, T),
    ) -> MutationOutcome {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;
        let entry = inner.stories.entry(story_id).or_default();

        let Some(mut mutation) = entry.pending.take() else {
            return MutationOutcome {
                state: MutationState::Idle,
                view: entry.view,
            };
        };

        match result {
            Ok(value) => {
                mutation.confirm();
                confirm(entry, value);
            }
            Err(err) => {
                if let Some(before) = mutation.roll_back() {
                    entry.restore(before);
                }
                warn!(%story_id, kind = ?mutation.kind, error = %err, "Mutation rolled back");
                if let Some(notice) = Notice::for_error(&err) {
                    inner.notices.push(notice);
                }
            }
        }

        entry.drain_queue(self.viewer_id);
        MutationOutcome {
            state: mutation.state(),
            view: entry.view,
        }
    }

    /// One round-trip under the retry policy. `idempotent` is false for
    /// mutations, which are only resent when the server applied nothing.
    async fn call<T, F, Fut>(&self, idempotent: bool, mut request: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let timeout = self.policy.request_timeout;
        with_retry(&self.policy.retry, || {
            let attempt = request();
            async move {
                with_deadline(timeout, attempt, |_| ApiError::Timeout)
                    .await
                    .map_err(|error| Attempt { error, idempotent })
            }
        })
        .await
        .map_err(|e| e.into_inner().error)
    }
}
