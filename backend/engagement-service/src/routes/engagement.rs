use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{Comment, LikeState},
    error::EngagementError,
    middleware::AuthenticatedUser,
    state::AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: i64,
    pub version: i64,
}

impl From<LikeState> for LikeResponse {
    fn from(state: LikeState) -> Self {
        Self {
            liked: state.liked,
            like_count: state.like_count,
            version: state.version,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCommentRequest {
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub comment: Comment,
    pub comment_count: i64,
    pub version: i64,
}

#[derive(Deserialize)]
pub struct CommentsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// POST /stories/{id}/like
/// Toggle the caller's like
#[post("/stories/{id}/like")]
pub async fn toggle_like(
    state: web::Data<AppState>,
    story_id: web::Path<Uuid>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, EngagementError> {
    let like = state
        .engagement
        .toggle_like(story_id.into_inner(), user.map(|u| u.0))
        .await?;
    Ok(HttpResponse::Ok().json(LikeResponse::from(like)))
}

/// GET /stories/{id}/like
/// Authoritative like state, used by clients to resync after reconnect
#[get("/stories/{id}/like")]
pub async fn like_status(
    state: web::Data<AppState>,
    story_id: web::Path<Uuid>,
    user: Option<AuthenticatedUser>,
) -> Result<HttpResponse, EngagementError> {
    let like = state
        .engagement
        .like_status(story_id.into_inner(), user.map(|u| u.0))
        .await?;
    Ok(HttpResponse::Ok().json(LikeResponse::from(like)))
}

/// POST /stories/{id}/comments
#[post("/stories/{id}/comments")]
pub async fn add_comment(
    state: web::Data<AppState>,
    story_id: web::Path<Uuid>,
    user: Option<AuthenticatedUser>,
    body: web::Json<AddCommentRequest>,
) -> Result<HttpResponse, EngagementError> {
    let created = state
        .engagement
        .add_comment(
            story_id.into_inner(),
            user.map(|u| u.0),
            &body.content,
            body.parent_id,
        )
        .await?;

    Ok(HttpResponse::Created().json(CommentResponse {
        comment: created.comment,
        comment_count: created.comment_count,
        version: created.version,
    }))
}

/// GET /stories/{id}/comments?limit=&offset=
#[get("/stories/{id}/comments")]
pub async fn list_comments(
    state: web::Data<AppState>,
    story_id: web::Path<Uuid>,
    query: web::Query<CommentsQuery>,
) -> Result<HttpResponse, EngagementError> {
    let comments = state
        .engagement
        .list_comments(story_id.into_inner(), query.limit, query.offset)
        .await?;
    Ok(HttpResponse::Ok().json(comments))
}
