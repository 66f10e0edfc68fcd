use axum::http::{HeaderMap, header::AUTHORIZATION};
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::jwt,
};

fn bearer_token(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;
    Ok(Some(token))
}

/// User id of the bearer token. Missing or invalid tokens are rejected.
pub(crate) fn current_user(headers: &HeaderMap, app_state: &AppState) -> AppResult<Uuid> {
    optional_user(headers, app_state)?.ok_or(AppError::Unauthorized)
}

/// Like `current_user`, but anonymous requests are allowed. A token that is
/// present must still be valid.
pub(crate) fn optional_user(headers: &HeaderMap, app_state: &AppState) -> AppResult<Option<Uuid>> {
    bearer_token(headers)?
        .map(|token| jwt::verify_user_id(token, &app_state.config.jwt_secret))
        .transpose()
}
