pub mod engagement;
pub mod stories;

pub use engagement::{EngagementCoordinator, EngagementLimits, TipRequest};
pub use stories::StoryService;
