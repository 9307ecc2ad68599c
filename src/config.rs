use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Idle window after which a typing indicator is considered expired.
    pub typing_ttl_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://courier.db?mode=rwc".into());
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let typing_ttl_ms = env::var("TYPING_TTL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5_000);

        Ok(Self {
            database_url,
            port,
            jwt_secret,
            typing_ttl_ms,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            port: 0,
            jwt_secret: "test-secret".into(),
            typing_ttl_ms: 200,
        }
    }
}
