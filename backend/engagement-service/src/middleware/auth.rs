//! Bearer token verification.
//!
//! Tokens are issued elsewhere; this service only checks them. A request with
//! no token passes through anonymously and handlers decide whether identity is
//! required. A token that is present but invalid is rejected with 401.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::rc::Rc;
use uuid::Uuid;

use crate::error::EngagementError;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub exp: usize,  // Expiration time
    #[serde(default)]
    pub iat: usize, // Issued at
}

/// Identity attached to a request by `JwtMiddleware`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>() {
            Some(user) => ready(Ok(*user)),
            None => ready(Err(EngagementError::Auth.into())),
        }
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// JWT authentication middleware (HS256)
pub struct JwtMiddleware {
    key: Rc<DecodingKey>,
}

impl JwtMiddleware {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Rc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareService {
            service,
            key: self.key.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: S,
    key: Rc<DecodingKey>,
}

impl<S> JwtMiddlewareService<S> {
    /// Browsers cannot set headers on a WebSocket upgrade, so `?token=` is accepted too
    fn bearer_token(req: &ServiceRequest) -> Result<Option<String>, EngagementError> {
        if let Some(header) = req.headers().get("Authorization") {
            let value = header.to_str().map_err(|_| EngagementError::Auth)?;
            let token = value.strip_prefix("Bearer ").ok_or(EngagementError::Auth)?;
            return Ok(Some(token.trim().to_string()));
        }

        Ok(
            actix_web::web::Query::<TokenQuery>::from_query(req.query_string())
                .ok()
                .and_then(|q| q.into_inner().token)
                .filter(|t| !t.is_empty()),
        )
    }

    fn authenticate(&self, req: &ServiceRequest) -> Result<Option<AuthenticatedUser>, EngagementError> {
        let Some(token) = Self::bearer_token(req)? else {
            return Ok(None);
        };

        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(&token, &self.key, &validation).map_err(|e| {
            tracing::warn!("JWT validation failed: {}", e);
            EngagementError::Auth
        })?;

        let user_id = Uuid::parse_str(&token_data.claims.sub).map_err(|e| {
            tracing::warn!("Invalid user_id UUID in token: {}", e);
            EngagementError::Auth
        })?;

        Ok(Some(AuthenticatedUser(user_id)))
    }
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match self.authenticate(&req) {
            Ok(Some(user)) => {
                req.extensions_mut().insert(user);
            }
            Ok(None) => {}
            Err(err) => {
                let res = req.error_response(err).map_into_right_body();
                return Box::pin(async move { Ok(res) });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn create_test_jwt(sub: &str, expires_in_seconds: i64, secret: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            exp: (now + expires_in_seconds) as usize,
            iat: now as usize,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn whoami(user: Option<AuthenticatedUser>) -> HttpResponse {
        match user {
            Some(AuthenticatedUser(id)) => HttpResponse::Ok().body(id.to_string()),
            None => HttpResponse::Ok().body("anonymous"),
        }
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .wrap(JwtMiddleware::new(SECRET))
                    .route("/whoami", web::get().to(whoami)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_valid_jwt_sets_identity() {
        let app = app!();
        let user_id = Uuid::new_v4();
        let token = create_test_jwt(&user_id.to_string(), 3600, SECRET);

        let req = test::TestRequest::get()
            .uri("/whoami")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;

        assert_eq!(body, user_id.to_string().as_bytes());
    }

    #[actix_web::test]
    async fn test_query_token_accepted() {
        let app = app!();
        let user_id = Uuid::new_v4();
        let token = create_test_jwt(&user_id.to_string(), 3600, SECRET);

        let req = test::TestRequest::get()
            .uri(&format!("/whoami?token={}", token))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;

        assert_eq!(body, user_id.to_string().as_bytes());
    }

    #[actix_web::test]
    async fn test_missing_token_is_anonymous() {
        let app = app!();
        let req = test::TestRequest::get().uri("/whoami").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "anonymous".as_bytes());
    }

    #[actix_web::test]
    async fn test_invalid_tokens_rejected() {
        let app = app!();
        let user_id = Uuid::new_v4().to_string();

        for token in [
            create_test_jwt(&user_id, -3600, SECRET),
            create_test_jwt(&user_id, 3600, "wrong-secret"),
            create_test_jwt("not-a-uuid", 3600, SECRET),
        ] {
            let req = test::TestRequest::get()
                .uri("/whoami")
                .insert_header(("Authorization", format!("Bearer {}", token)))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 401);
        }
    }
}
