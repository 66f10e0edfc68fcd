use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use secrecy::ExposeSecret;

/// Access token claims issued by the identity service. `sub` is the user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
}

pub fn verify(token: &str, secret: &secrecy::SecretString) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Hosted identity tokens carry an audience we don't pin.
    validation.validate_aud = false;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        AppError::Unauthorized
    })
}

/// Verify `token` and return the user id it was issued for.
pub fn verify_user_id(token: &str, secret: &secrecy::SecretString) -> AppResult<Uuid> {
    let claims = verify(token, secret)?;
    Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)
}
