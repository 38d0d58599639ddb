//! Custom middleware for authentication and authorization.

mod jwt_middleware;
mod role_guard;

pub use jwt_middleware::JwtMiddleware;
pub use role_guard::RequireRole;
