use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};

use super::dto::{ApiJson, RegisterRequest};
use crate::{
    error::ApiError,
    state::AppState,
    uploads::{AvatarForm, TempUpload},
};

/// Registration accepts either a JSON body or a multipart form with an
/// optional `avatar` file.
pub struct RegisterInput {
    pub fields: RegisterRequest,
    pub avatar: Option<TempUpload>,
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

#[async_trait]
impl FromRequest<AppState> for RegisterInput {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        if !is_multipart(&req) {
            let ApiJson(fields) = ApiJson::<RegisterRequest>::from_request(req, state).await?;
            return Ok(Self {
                fields,
                avatar: None,
            });
        }

        let multipart = Multipart::from_request(req, state).await?;
        let mut form = AvatarForm::parse(multipart, &state.config.http.upload_dir).await?;
        let fields = RegisterRequest {
            name: form.take("name"),
            username: form.take("username"),
            email: form.take("email"),
            password: form.take("password"),
        };
        Ok(Self {
            fields,
            avatar: form.avatar,
        })
    }
}

/// Multipart body of the avatar update; only the file matters.
pub struct AvatarInput(pub Option<TempUpload>);

#[async_trait]
impl FromRequest<AppState> for AvatarInput {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        if !is_multipart(&req) {
            return Ok(Self(None));
        }
        let multipart = Multipart::from_request(req, state).await?;
        let form = AvatarForm::parse(multipart, &state.config.http.upload_dir).await?;
        Ok(Self(form.avatar))
    }
}
