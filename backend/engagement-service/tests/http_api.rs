/// End-to-end HTTP tests against the in-memory repository
use actix_web::{http::StatusCode, test, web, App};
use engagement_service::{
    middleware::{Claims, JwtMiddleware},
    repository::InMemoryStoryRepository,
    routes,
    services::EngagementLimits,
    state::AppState,
    websocket::Notifier,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const SECRET: &str = "http-test-secret";

fn bearer(user_id: Uuid) -> (&'static str, String) {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + 3600) as usize,
        iat: now as usize,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    ("Authorization", format!("Bearer {}", token))
}

fn app_state() -> web::Data<AppState> {
    web::Data::new(AppState::new(
        Arc::new(InMemoryStoryRepository::default()),
        Notifier::start(16),
        EngagementLimits::default(),
        None,
    ))
}

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .app_data(app_state())
                .wrap(JwtMiddleware::new(SECRET))
                .configure(routes::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_story_engagement_flow() {
    let app = app!();
    let author = Uuid::new_v4();
    let reader = Uuid::new_v4();

    // Draft
    let req = test::TestRequest::post()
        .uri("/api/v1/stories")
        .insert_header(bearer(author))
        .set_json(json!({ "title": "The year I moved", "body": "It started with a suitcase." }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let story: Value = test::read_body_json(resp).await;
    assert_eq!(story["status"], "draft");
    let id = story["id"].as_str().unwrap().to_string();

    // Drafts are invisible to other readers
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/stories/{}", id))
        .insert_header(bearer(reader))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    // Publish
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{}/publish", id))
        .insert_header(bearer(author))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let story: Value = test::read_body_json(resp).await;
    assert_eq!(story["status"], "published");

    // Like needs identity
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{}/like", id))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{}/like", id))
        .insert_header(bearer(reader))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let like: Value = test::read_body_json(resp).await;
    assert_eq!(like["liked"], true);
    assert_eq!(like["likeCount"], 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/stories/{}/like", id))
        .insert_header(bearer(reader))
        .to_request();
    let like: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(like["liked"], true);

    // Comments
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{}/comments", id))
        .insert_header(bearer(reader))
        .set_json(json!({ "content": "   " }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "validation");
    assert_eq!(err["retryable"], false);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{}/comments", id))
        .insert_header(bearer(reader))
        .set_json(json!({ "content": "This stayed with me." }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["commentCount"], 1);
    assert_eq!(created["comment"]["content"], "This stayed with me.");

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/stories/{}/comments", id))
        .to_request();
    let comments: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(comments.as_array().map(|c| c.len()), Some(1));

    // Views are anonymous
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{}/views", id))
        .to_request();
    let views: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(views["views"], 1);

    // Tips
    let req = test::TestRequest::post()
        .uri("/api/v1/payments/tip-confirm")
        .insert_header(bearer(reader))
        .set_json(json!({ "storyId": id, "amount": "5.00", "paymentReference": "pi_http_1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let tip: Value = test::read_body_json(resp).await;
    assert_eq!(tip["amount"], "5.00");
    assert_eq!(tip["toUserId"], author.to_string());

    let req = test::TestRequest::post()
        .uri("/api/v1/payments/tip-confirm")
        .insert_header(bearer(reader))
        .set_json(json!({ "storyId": id, "amount": "5.00", "paymentReference": "pi_http_1" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let dup: Value = test::read_body_json(resp).await;
    assert_eq!(dup, json!({ "duplicate": true }));

    let req = test::TestRequest::post()
        .uri("/api/v1/payments/tip-confirm")
        .insert_header(bearer(reader))
        .set_json(json!({ "storyId": id, "amount": 2.5, "paymentReference": "pi_http_2" }))
        .to_request();
    let tip: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(tip["amount"], "2.50");

    let req = test::TestRequest::post()
        .uri("/api/v1/payments/tip-confirm")
        .insert_header(bearer(reader))
        .set_json(json!({ "storyId": id, "amount": "1.234", "paymentReference": "pi_http_3" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

    // Archive: author only, then engagement conflicts
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{}/archive", id))
        .insert_header(bearer(reader))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{}/archive", id))
        .insert_header(bearer(author))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{}/like", id))
        .insert_header(bearer(reader))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn test_unknown_story_is_not_found() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/stories/{}/like", Uuid::new_v4()))
        .insert_header(bearer(Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "not_found");
}

#[actix_web::test]
async fn test_invalid_token_is_rejected() {
    let app = app!();
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/stories/{}", Uuid::new_v4()))
        .insert_header(("Authorization", "Bearer not.a.token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "auth");
}

#[actix_web::test]
async fn test_anonymous_tip_is_unauthorized_before_amount_checks() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/api/v1/payments/tip-confirm")
        .set_json(json!({
            "storyId": Uuid::new_v4(),
            "amount": "not-money",
            "paymentReference": "pi_anon"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let err: Value = test::read_body_json(resp).await;
    assert_eq!(err["error"], "auth");
}

#[actix_web::test]
async fn test_health_and_ready() {
    let app = app!();
    for path in ["/health", "/ready"] {
        let req = test::TestRequest::get().uri(path).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
