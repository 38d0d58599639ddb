use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    /// Bootstrap admin account, created on startup when no admin exists
    #[serde(default)]
    pub admin: Option<AdminSettings>,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Mark the refresh-token cookie `Secure` (production)
    #[serde(default)]
    pub secure_cookies: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }

    /// Server-level connection, used to create throwaway test databases
    pub fn connection_string_without_db(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }
}

/// Token signing settings
///
/// Access and refresh tokens are signed with different secrets so a leak of
/// one cannot be used to forge the other. Missing secrets load as empty and
/// are rejected by [`JwtSettings::validate`] at startup.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    #[serde(default)]
    pub access_token_secret: String,
    #[serde(default)]
    pub refresh_token_secret: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64, // seconds
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

fn default_access_token_expiry() -> i64 {
    15 * 60
}

fn default_refresh_token_expiry() -> i64 {
    7 * 24 * 60 * 60
}

fn default_issuer() -> String {
    "fleet_auth".to_string()
}

impl JwtSettings {
    /// Refuse to run with empty or shared secrets
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.access_token_secret".to_string()));
        }
        if self.refresh_token_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.refresh_token_secret".to_string()));
        }
        if self.access_token_secret == self.refresh_token_secret {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_secret and jwt.refresh_token_secret must differ".to_string(),
            ));
        }
        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt token expiries must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct AuthSettings {
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,
    /// Issue a new refresh token (and revoke the presented one) on every refresh
    #[serde(default)]
    pub rotate_refresh_tokens: bool,
}

fn default_password_hash_cost() -> u32 {
    12
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            password_hash_cost: default_password_hash_cost(),
            rotate_refresh_tokens: false,
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct AdminSettings {
    pub email: String,
    pub password: String,
    #[serde(default = "default_admin_name")]
    pub name: String,
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

/// Load `configuration.yaml` (optional) overlaid with `APP_*` environment
/// variables, e.g. `APP_JWT__ACCESS_TOKEN_SECRET`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
