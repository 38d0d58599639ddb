use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::{AuthService, PublicAccount, Role};
use crate::configuration::AdminSettings;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::{JwtMiddleware, RequireRole};
use crate::routes::{
    account_sessions, change_password, health_check, login, logout, me, refresh, register,
    sessions, CookiePolicy,
};

pub fn run(
    listener: TcpListener,
    auth: AuthService,
    secure_cookies: bool,
) -> Result<Server, std::io::Error> {
    let auth = web::Data::new(auth);
    let cookie_policy = web::Data::new(CookiePolicy {
        secure: secure_cookies,
    });

    let server = HttpServer::new(move || {
        // Malformed bodies get the same error envelope as everything else
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            AppError::Validation(ValidationError::InvalidRequest(err.to_string())).into()
        });

        App::new()
            .wrap(LoggerMiddleware)
            .app_data(json_config)
            .app_data(auth.clone())
            .app_data(cookie_policy.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/auth")
                    // Public routes
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    // Protected routes (require a Bearer access token)
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware::new(auth.tokens().clone()))
                            .route(web::get().to(me)),
                    )
                    .service(
                        web::resource("/change-password")
                            .wrap(JwtMiddleware::new(auth.tokens().clone()))
                            .route(web::post().to(change_password)),
                    )
                    .service(
                        web::resource("/sessions")
                            .wrap(JwtMiddleware::new(auth.tokens().clone()))
                            .route(web::get().to(sessions)),
                    )
                    // Admin routes: the role guard runs after the token check
                    .service(
                        web::resource("/users/{id}/sessions")
                            .wrap(RequireRole::new(&[Role::Admin]))
                            .wrap(JwtMiddleware::new(auth.tokens().clone()))
                            .route(web::get().to(account_sessions)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Create the configured admin account if none exists yet.
///
/// Failures (e.g. the email already belongs to a regular account) are logged
/// and the server starts anyway.
pub async fn bootstrap_admin(auth: &AuthService, admin: &AdminSettings) -> Option<PublicAccount> {
    match auth.ensure_default_admin(admin).await {
        Ok(created) => created,
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "Failed to create default admin user");
            None
        }
    }
}
