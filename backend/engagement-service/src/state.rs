use sqlx::PgPool;
use std::sync::Arc;

use crate::{
    repository::StoryRepository,
    services::{EngagementCoordinator, EngagementLimits, StoryService},
    websocket::Notifier,
};

#[derive(Clone)]
pub struct AppState {
    pub engagement: EngagementCoordinator,
    pub stories: StoryService,
    pub notifier: Notifier,
    /// Present when running against PostgreSQL; used by the readiness probe
    pub db: Option<PgPool>,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn StoryRepository>,
        notifier: Notifier,
        limits: EngagementLimits,
        db: Option<PgPool>,
    ) -> Self {
        Self {
            engagement: EngagementCoordinator::new(repo.clone(), notifier.clone(), limits),
            stories: StoryService::new(repo),
            notifier,
            db,
        }
    }
}
