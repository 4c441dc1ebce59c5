use axum::{
    extract::FromRef,
    http::{header::SET_COOKIE, HeaderValue},
    response::AppendHeaders,
};
use serde::Serialize;
use tracing::info;

use super::{
    cookies::{clear_cookie, token_cookie, ACCESS_COOKIE, REFRESH_COOKIE},
    jwt::JwtKeys,
};
use crate::{error::ApiError, state::AppState, users::model::User};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub type CookieHeaders = AppendHeaders<[(axum::http::HeaderName, HeaderValue); 2]>;

/// Sign a fresh access/refresh pair for `user` and make the refresh token the
/// only one the store will accept for that user from now on.
pub async fn issue_tokens(state: &AppState, user: &User) -> Result<TokenPair, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user)?;
    let refresh_token = keys.sign_refresh(user.id)?;

    state
        .users
        .set_refresh_token(user.id, Some(&refresh_token))
        .await?;

    info!(user_id = %user.id, "token pair issued");
    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

pub fn set_token_cookies(state: &AppState, pair: &TokenPair) -> Result<CookieHeaders, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let secure = state.config.http.cookie_secure;
    let access = token_cookie(ACCESS_COOKIE, &pair.access_token, keys.access_ttl, secure)
        .map_err(anyhow::Error::from)?;
    let refresh = token_cookie(REFRESH_COOKIE, &pair.refresh_token, keys.refresh_ttl, secure)
        .map_err(anyhow::Error::from)?;
    Ok(AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]))
}

pub fn clear_token_cookies(state: &AppState) -> Result<CookieHeaders, ApiError> {
    let secure = state.config.http.cookie_secure;
    let access = clear_cookie(ACCESS_COOKIE, secure).map_err(anyhow::Error::from)?;
    let refresh = clear_cookie(REFRESH_COOKIE, secure).map_err(anyhow::Error::from)?;
    Ok(AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]))
}
