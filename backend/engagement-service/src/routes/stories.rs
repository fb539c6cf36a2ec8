use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::EngagementError, middleware::AuthenticatedUser, state::AppState};

#[derive(Deserialize)]
pub struct CreateStoryRequest {
    pub title: String,
    pub body: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResponse {
    pub story_id: Uuid,
    pub views: i64,
}

/// POST /stories
/// Create a draft owned by the caller
#[post("/stories")]
pub async fn create_story(
    state: web::Data<AppState>,
    user: Option<AuthenticatedUser>,
    body: web::Json<CreateStoryRequest>,
) -> Result<HttpResponse, EngagementError> {
    let story = state
        .stories
        .create_story(user.map(|u| u.0), &body.title, &body.body)
        .await?;
    Ok(HttpResponse::Created().json(story))
}

/// GET /stories/{id}
#[get("/stories/{id}")]
pub async fn get_story(
    state: web::Data<AppState>,
    story_id: web::Path<Uuid>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, EngagementError> {
    let story = state
        .stories
        .get_story(user.map(|u| u.0), story_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(story))
}

/// POST /stories/{id}/publish
#[post("/stories/{id}/publish")]
pub async fn publish_story(
    state: web::Data<AppState>,
    story_id: web::Path<Uuid>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, EngagementError> {
    let story = state
        .stories
        .publish_story(user.map(|u| u.0), story_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(story))
}

/// POST /stories/{id}/archive
#[post("/stories/{id}/archive")]
pub async fn archive_story(
    state: web::Data<AppState>,
    story_id: web::Path<Uuid>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, EngagementError> {
    let story = state
        .stories
        .archive_story(user.map(|u| u.0), story_id.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(story))
}

/// POST /stories/{id}/views
/// Count a read; anonymous readers count too
#[post("/stories/{id}/views")]
pub async fn record_view(
    state: web::Data<AppState>,
    story_id: web::Path<Uuid>,
) -> Result<HttpResponse, EngagementError> {
    let story_id = story_id.into_inner();
    let views = state.engagement.record_view(story_id).await?;
    Ok(HttpResponse::Ok().json(ViewResponse { story_id, views }))
}
