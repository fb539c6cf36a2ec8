//! Client-side engagement cache for a story screen
//!
//! Keeps the like/comment counters a viewer sees consistent with the server:
//! user actions are applied optimistically, confirmed with the server's
//! authoritative counters or rolled back to the pre-action snapshot, and
//! pushed engagement events are merged in version order.

pub mod api;
pub mod cache;
pub mod error;
pub mod mutation;

pub use api::{AckedComment, CommentAck, EngagementApi, LikeSnapshot};
pub use cache::{EventOutcome, MutationOutcome, StoryCache, StoryView, SyncPolicy};
pub use error::{ApiError, Notice};
pub use mutation::{MutationKind, MutationState, PendingMutation};
