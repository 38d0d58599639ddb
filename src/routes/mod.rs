mod auth;
mod health_check;

use serde::Serialize;

pub use auth::{
    account_sessions, change_password, login, logout, me, refresh, register, sessions, CookiePolicy,
    REFRESH_COOKIE,
};
pub use health_check::health_check;

/// Success envelope: `{"success": true, "data": ...}` or `{"success": true, "message": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }
}
