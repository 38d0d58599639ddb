//! Authentication routes
//!
//! Thin boundary over `AuthService`: parse the request, call the core, render
//! the tagged result. The refresh token travels in an HTTP-only cookie; the
//! refresh and logout endpoints also accept it in the JSON body.

use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{AccessClaims, AuthService, PublicAccount, RefreshTokenRecord, Role};
use crate::error::{AppError, AuthError};
use crate::routes::ApiResponse;
use crate::validators::is_valid_name;

pub const REFRESH_COOKIE: &str = "refreshToken";

/// Cookie attributes that depend on deployment
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub secure: bool,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Body of register/login responses. The refresh token only goes in the cookie.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
    user: PublicAccount,
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenBody {
    access_token: String,
}

#[derive(Serialize)]
struct ProfileBody {
    user: Profile,
}

#[derive(Serialize)]
struct Profile {
    id: i64,
    email: String,
    role: Role,
}

#[derive(Serialize)]
struct SessionsBody {
    sessions: Vec<SessionSummary>,
}

/// A live refresh token, without the token itself
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSummary {
    id: i64,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<RefreshTokenRecord> for SessionSummary {
    fn from(record: RefreshTokenRecord) -> Self {
        Self {
            id: record.id,
            created_at: record.created_at,
            expires_at: record.expires_at,
        }
    }
}

fn sessions_response(records: Vec<RefreshTokenRecord>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::data(SessionsBody {
        sessions: records.into_iter().map(SessionSummary::from).collect(),
    }))
}

fn refresh_cookie(token: String, max_age_seconds: i64, policy: &CookiePolicy) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(policy.secure)
        .same_site(SameSite::Strict)
        .max_age(Duration::seconds(max_age_seconds))
        .finish()
}

fn removal_cookie(policy: &CookiePolicy) -> Cookie<'static> {
    let mut cookie = refresh_cookie(String::new(), 0, policy);
    cookie.make_removal();
    cookie
}

/// Refresh token from the cookie, falling back to the JSON body
fn presented_refresh_token(req: &HttpRequest, body: Option<web::Json<RefreshRequest>>) -> Option<String> {
    req.cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| body.and_then(|b| b.into_inner().refresh_token))
        .filter(|token| !token.is_empty())
}

fn with_cookie(mut response: HttpResponse, cookie: &Cookie<'_>) -> Result<HttpResponse, AppError> {
    response
        .add_cookie(cookie)
        .map_err(|e| AppError::Internal(format!("Failed to set cookie: {}", e)))?;
    Ok(response)
}

/// POST /api/auth/register
///
/// # Errors
/// - 400: invalid email, weak password, invalid name or malformed body
/// - 409: email already registered
pub async fn register(
    body: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let name = is_valid_name(&body.name)?;

    let session = auth
        .register(&body.email, &body.password, &name, body.role.unwrap_or_default())
        .await?;

    let cookie = refresh_cookie(
        session.refresh_token,
        auth.tokens().refresh_token_expiry(),
        &policy,
    );
    Ok(HttpResponse::Created().cookie(cookie).json(ApiResponse::data(SessionBody {
        user: session.user,
        access_token: session.access_token,
    })))
}

/// POST /api/auth/login
///
/// # Errors
/// - 401: invalid credentials (unknown email and wrong password look the same)
/// - 403: account disabled
/// - 423: account locked
pub async fn login(
    body: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let session = auth.login(&body.email, &body.password).await?;

    let cookie = refresh_cookie(
        session.refresh_token,
        auth.tokens().refresh_token_expiry(),
        &policy,
    );
    Ok(HttpResponse::Ok().cookie(cookie).json(ApiResponse::data(SessionBody {
        user: session.user,
        access_token: session.access_token,
    })))
}

/// POST /api/auth/refresh
///
/// Any failure clears the refresh cookie.
pub async fn refresh(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let token = match presented_refresh_token(&req, body) {
        Some(token) => token,
        None => return Err(AuthError::MissingRefreshToken.into()),
    };

    match auth.refresh_access_token(&token).await {
        Ok(refreshed) => {
            let mut response = HttpResponse::Ok();
            if let Some(rotated) = refreshed.refresh_token {
                response.cookie(refresh_cookie(
                    rotated,
                    auth.tokens().refresh_token_expiry(),
                    &policy,
                ));
            }
            Ok(response.json(ApiResponse::data(AccessTokenBody {
                access_token: refreshed.access_token,
            })))
        }
        Err(e) => with_cookie(e.error_response(), &removal_cookie(&policy)),
    }
}

/// POST /api/auth/logout
///
/// Always succeeds; unknown tokens are ignored.
pub async fn logout(
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    if let Some(token) = presented_refresh_token(&req, body) {
        auth.logout(&token).await?;
    }

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(&policy))
        .json(ApiResponse::message("Logged out successfully")))
}

/// GET /api/auth/me
///
/// Requires `Authorization: Bearer <access_token>`.
pub async fn me(claims: web::ReqData<AccessClaims>) -> Result<HttpResponse, AppError> {
    let claims = claims.into_inner();

    Ok(HttpResponse::Ok().json(ApiResponse::data(ProfileBody {
        user: Profile {
            id: claims.user_id()?,
            email: claims.email,
            role: claims.role,
        },
    })))
}

/// POST /api/auth/change-password
///
/// Revokes every session of the account; the caller has to log in again.
pub async fn change_password(
    claims: web::ReqData<AccessClaims>,
    body: web::Json<ChangePasswordRequest>,
    auth: web::Data<AuthService>,
    policy: web::Data<CookiePolicy>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;
    auth.change_password(user_id, &body.current_password, &body.new_password)
        .await?;

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(&policy))
        .json(ApiResponse::message(
            "Password changed. Please log in again.",
        )))
}

/// GET /api/auth/sessions
///
/// Live sessions of the caller.
pub async fn sessions(
    claims: web::ReqData<AccessClaims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let records = auth.active_sessions(claims.user_id()?).await?;
    Ok(sessions_response(records))
}

/// GET /api/auth/users/{id}/sessions
///
/// Admin only. Live sessions of any account.
pub async fn account_sessions(
    path: web::Path<i64>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let records = auth.active_sessions(path.into_inner()).await?;
    Ok(sessions_response(records))
}
