use actix_web::{web, HttpResponse};

use crate::state::AppState;

pub mod engagement;
pub mod payments;
pub mod stories;
pub mod wsroute;

/// Mounts every route of the service
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/ready", web::get().to(ready))
        .service(wsroute::story_feed)
        .service(
            web::scope("/api/v1")
                .service(stories::create_story)
                .service(stories::get_story)
                .service(stories::publish_story)
                .service(stories::archive_story)
                .service(stories::record_view)
                .service(engagement::toggle_like)
                .service(engagement::like_status)
                .service(engagement::add_comment)
                .service(engagement::list_comments)
                .service(payments::tip_confirm),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

async fn ready(state: web::Data<AppState>) -> HttpResponse {
    if let Some(db) = &state.db {
        if let Err(e) = sqlx::query("SELECT 1").execute(db).await {
            tracing::warn!(error = %e, "Readiness check failed");
            return HttpResponse::ServiceUnavailable().body("NOT READY");
        }
    }
    HttpResponse::Ok().body("READY")
}
