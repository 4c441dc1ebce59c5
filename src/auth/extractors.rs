use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::{
    cookies::{bearer_token, read_cookie, ACCESS_COOKIE},
    jwt::JwtKeys,
};
use crate::{error::ApiError, state::AppState, users::model::PublicUser};

/// Authentication gate. Resolves the access credential (cookie first, then
/// `Authorization: Bearer`) to the sanitized record of its owner.
pub struct AuthUser(pub PublicUser);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = read_cookie(&parts.headers, ACCESS_COOKIE)
            .or_else(|| bearer_token(&parts.headers))
            .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

        let claims = JwtKeys::from_ref(state).verify_access(&token).map_err(|e| {
            warn!(error = %e, "invalid or expired access token");
            ApiError::unauthorized("Invalid access token")
        })?;

        let user = state
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "access token for unknown user");
                ApiError::unauthorized("Invalid access token")
            })?;

        Ok(AuthUser(user.into()))
    }
}
