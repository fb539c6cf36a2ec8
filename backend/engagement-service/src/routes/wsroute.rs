use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use uuid::Uuid;

use crate::{
    middleware::AuthenticatedUser, state::AppState, websocket::session::StorySession,
};

/// GET /ws/stories/{id}
/// Live engagement feed for one story. Anonymous readers may subscribe.
#[get("/ws/stories/{id}")]
pub async fn story_feed(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    story_id: web::Path<Uuid>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, Error> {
    let story_id = story_id.into_inner();

    // Drafts and unknown ids are rejected before upgrading
    state
        .stories
        .get_story(user.map(|u| u.0), story_id)
        .await?;

    let subscription = state.notifier.subscribe(story_id).await;
    let subscriber_id = subscription.id;
    let session = StorySession::new(subscription, state.notifier.clone());

    match ws::start(session, &req, stream) {
        Ok(resp) => Ok(resp),
        Err(e) => {
            tracing::warn!(%story_id, error = %e, "WebSocket handshake failed");
            state.notifier.unsubscribe(story_id, subscriber_id).await;
            Err(e)
        }
    }
}
