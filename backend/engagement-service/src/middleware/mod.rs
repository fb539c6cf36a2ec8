pub mod auth;

pub use auth::{AuthenticatedUser, Claims, JwtMiddleware};
