//! Lifecycle of one optimistic user action
//!
//! ```text
//! Idle --apply--> Optimistic --confirm--> Confirmed
//!                     |
//!                     +--roll_back--> RolledBack
//! ```
//! `Confirmed` and `RolledBack` are terminal.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Optimistic,
    Confirmed,
    RolledBack,
}

impl MutationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MutationState::Confirmed | MutationState::RolledBack)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ToggleLike,
    AddComment,
}

/// Counter values a mutation touches, captured before it is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Snapshot {
    pub liked: bool,
    pub like_count: i64,
    pub comment_count: i64,
}

#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: u64,
    pub story_id: Uuid,
    pub kind: MutationKind,
    state: MutationState,
    snapshot: Option<Snapshot>,
}

impl PendingMutation {
    pub fn new(id: u64, story_id: Uuid, kind: MutationKind) -> Self {
        Self {
            id,
            story_id,
            kind,
            state: MutationState::Idle,
            snapshot: None,
        }
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    /// Records the pre-action values and marks the mutation in flight.
    /// Returns false if the mutation already left `Idle`.
    pub(crate) fn apply(&mut self, before: Snapshot) -> bool {
        if self.state != MutationState::Idle {
            return false;
        }
        self.snapshot = Some(before);
        self.state = MutationState::Optimistic;
        true
    }

    pub(crate) fn confirm(&mut self) -> bool {
        if self.state != MutationState::Optimistic {
            return false;
        }
        self.state = MutationState::Confirmed;
        true
    }

    /// Hands back the snapshot to restore
    pub(crate) fn roll_back(&mut self) -> Option<Snapshot> {
        if self.state != MutationState::Optimistic {
            return None;
        }
        self.state = MutationState::RolledBack;
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            liked: false,
            like_count: 3,
            comment_count: 1,
        }
    }

    #[test]
    fn test_happy_path() {
        let mut m = PendingMutation::new(1, Uuid::new_v4(), MutationKind::ToggleLike);
        assert_eq!(m.state(), MutationState::Idle);
        assert!(m.apply(snapshot()));
        assert_eq!(m.state(), MutationState::Optimistic);
        assert!(m.confirm());
        assert!(m.state().is_terminal());
        assert_eq!(m.roll_back(), None);
    }

    #[test]
    fn test_roll_back_returns_snapshot_once() {
        let mut m = PendingMutation::new(2, Uuid::new_v4(), MutationKind::AddComment);
        assert!(m.apply(snapshot()));
        assert_eq!(m.roll_back(), Some(snapshot()));
        assert_eq!(m.state(), MutationState::RolledBack);
        assert_eq!(m.roll_back(), None);
        assert!(!m.confirm());
    }

    #[test]
    fn test_cannot_confirm_before_apply() {
        let mut m = PendingMutation::new(3, Uuid::new_v4(), MutationKind::ToggleLike);
        assert!(!m.confirm());
        assert_eq!(m.roll_back(), None);
        assert_eq!(m.state(), MutationState::Idle);
    }
}
