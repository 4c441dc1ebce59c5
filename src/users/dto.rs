use axum::extract::FromRequest;
use serde::{Deserialize, Serialize};

use crate::{auth::tokens::TokenPair, error::ApiError, users::model::PublicUser};

/// `Json` whose rejections use the error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Request body for registration. Every field is optional at the wire level
/// so a missing field and a blank one get the same answer.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(alias = "username", alias = "email")]
    pub username_or_email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
    pub confirm_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDetailsRequest {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
}

/// Data of a successful login.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: PublicUser,
    #[serde(flatten)]
    pub tokens: TokenPair,
}
