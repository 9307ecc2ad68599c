use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    /// Expiration, unix seconds.
    pub exp: usize,
}

/// Mint an HS256 token for a user. Token issuance normally belongs to the
/// identity service; this helper exists for development setups and tests.
pub fn issue_token(user_id: Uuid, secret: &str, ttl: Duration) -> Result<String, AppError> {
    let exp = chrono::Utc::now().timestamp() as usize + ttl.as_secs() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::Internal)
}

/// Validate the signature and expiry, returning the caller's user id.
pub fn verify_token(token: &str, secret: &str) -> Result<Uuid, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;
    Uuid::parse_str(&data.claims.sub).map_err(|_| AppError::Unauthorized)
}

/// Middleware that extracts the bearer token and adds the user id to
/// request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let user_id = verify_token(token, &state.config.jwt_secret)?;
    req.extensions_mut().insert(user_id);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_the_user_id() {
        let user = Uuid::new_v4();
        let token = issue_token(user, "s3cret", Duration::from_secs(60)).unwrap();
        assert_eq!(verify_token(&token, "s3cret").unwrap(), user);
    }

    #[test]
    fn rejects_wrong_secret_and_garbage() {
        let user = Uuid::new_v4();
        let token = issue_token(user, "s3cret", Duration::from_secs(60)).unwrap();
        assert!(verify_token(&token, "other").is_err());
        assert!(verify_token("not-a-token", "s3cret").is_err());
    }
}
