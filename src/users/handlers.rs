use axum::{
    extract::{DefaultBodyLimit, FromRef, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::{
    dto::{
        ApiJson, LoginRequest, LoginResponse, RefreshRequest, UpdateDetailsRequest,
        UpdatePasswordRequest,
    },
    forms::{AvatarInput, RegisterInput},
    model::{NewUser, PublicUser, UserChanges},
    validation::{is_blank, normalize_handle, normalized_email, require_all},
};
use crate::{
    auth::{
        cookies::{read_cookie, REFRESH_COOKIE},
        jwt::JwtKeys,
        password::{hash_password_async, verify_password_async},
        tokens::{
            clear_token_cookies, issue_tokens, set_token_cookies, CookieHeaders, TokenPair,
        },
        AuthUser,
    },
    error::ApiError,
    media,
    response::ApiResponse,
    state::AppState,
};

/// JSON-only routes keep small bodies; multipart routes get the upload limit.
const JSON_BODY_LIMIT: usize = 16 * 1024;

pub fn account_routes(max_upload_bytes: usize) -> Router<AppState> {
    let uploads = Router::new()
        .route("/register", post(register))
        .route("/update-avatar", post(update_avatar))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    let json = Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
        .route("/user", get(current_user))
        .route("/update-password", post(update_password))
        .route("/update-user-details", post(update_details))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT));

    uploads.merge(json)
}

#[instrument(skip(state, input))]
pub async fn register(
    State(state): State<AppState>,
    input: RegisterInput,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let RegisterInput { fields, avatar } = input;
    let [name, username, email, password] = require_all(
        [
            fields.name.as_deref(),
            fields.username.as_deref(),
            fields.email.as_deref(),
            fields.password.as_deref(),
        ],
        "All fields are required",
    )?;
    let name = name.trim().to_string();
    let username = normalize_handle(&username);
    let email = normalized_email(&email)?;

    if state
        .users
        .find_by_username_or_email(&username, &email)
        .await?
        .is_some()
    {
        warn!(%username, %email, "username or email already registered");
        return Err(ApiError::conflict(
            "User with email or username already exists",
        ));
    }

    let password = hash_password_async(password).await?;

    let stored = match &avatar {
        Some(upload) => Some(media::upload_avatar(&state, upload).await?),
        None => None,
    };
    // the local copy is no longer needed once the media host has it
    drop(avatar);

    let new_user = NewUser {
        name,
        username,
        email,
        password,
        avatar: stored.as_ref().map(|a| a.url.clone()),
    };
    let inserted = match state.users.insert(new_user).await {
        Ok(user) => user,
        Err(e) => {
            if let Some(a) = &stored {
                media::discard_avatar(&state, a).await;
            }
            return Err(e.into());
        }
    };

    let created = state
        .users
        .find_by_id(inserted.id)
        .await?
        .ok_or_else(|| ApiError::internal("Something went wrong while registering the user"))?;

    info!(user_id = %created.id, username = %created.username, "user registered");
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        created.into(),
        "User registered successfully",
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<(CookieHeaders, ApiResponse<LoginResponse>), ApiError> {
    if is_blank(payload.username_or_email.as_deref()) {
        return Err(ApiError::bad_request("Username or email is required"));
    }
    let identifier = normalize_handle(payload.username_or_email.as_deref().unwrap_or_default());
    let password = payload
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("Password is required"))?;

    let user = state
        .users
        .find_by_login(&identifier)
        .await?
        .ok_or_else(|| {
            warn!(%identifier, "login for unknown user");
            ApiError::not_found("User does not exist")
        })?;

    if !verify_password_async(password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    let tokens = issue_tokens(&state, &user).await?;
    let cookies = set_token_cookies(&state, &tokens)?;

    info!(user_id = %user.id, "user logged in");
    Ok((
        cookies,
        ApiResponse::ok(
            LoginResponse {
                user: user.into(),
                tokens,
            },
            "User logged in successfully",
        ),
    ))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<(CookieHeaders, ApiResponse<Value>), ApiError> {
    state.users.set_refresh_token(user.id, None).await?;
    let cookies = clear_token_cookies(&state)?;
    info!("user logged out");
    Ok((cookies, ApiResponse::ok(json!({}), "User logged out")))
}

#[instrument(skip(state, me, headers, body), fields(user_id = %me.id))]
pub async fn refresh_token(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    headers: HeaderMap,
    body: Option<ApiJson<RefreshRequest>>,
) -> Result<(CookieHeaders, ApiResponse<TokenPair>), ApiError> {
    let incoming = read_cookie(&headers, REFRESH_COOKIE)
        .or_else(|| body.and_then(|ApiJson(b)| b.refresh_token))
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = JwtKeys::from_ref(&state)
        .verify_refresh(&incoming)
        .map_err(|e| {
            warn!(error = %e, "invalid refresh token");
            ApiError::unauthorized("Invalid refresh token")
        })?;
    if claims.sub != me.id {
        warn!(token_sub = %claims.sub, "refresh token belongs to another user");
        return Err(ApiError::unauthorized("Invalid refresh token"));
    }

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %claims.sub, "refresh token for unknown user");
            ApiError::unauthorized("Invalid refresh token")
        })?;

    if user.refresh_token.as_deref() != Some(incoming.as_str()) {
        warn!(user_id = %user.id, "stale or reused refresh token");
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let tokens = issue_tokens(&state, &user).await?;
    let cookies = set_token_cookies(&state, &tokens)?;
    info!(user_id = %user.id, "access token refreshed");
    Ok((cookies, ApiResponse::ok(tokens, "Access token refreshed")))
}

pub async fn current_user(AuthUser(user): AuthUser) -> ApiResponse<PublicUser> {
    ApiResponse::ok(user, "Current user fetched successfully")
}

#[instrument(skip(state, me, payload), fields(user_id = %me.id))]
pub async fn update_password(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    ApiJson(payload): ApiJson<UpdatePasswordRequest>,
) -> Result<ApiResponse<Value>, ApiError> {
    let [old_password, new_password, confirm_password] = require_all(
        [
            payload.old_password.as_deref(),
            payload.new_password.as_deref(),
            payload.confirm_password.as_deref(),
        ],
        "All password fields are required",
    )?;
    if old_password == new_password {
        return Err(ApiError::bad_request(
            "New password must differ from the old password",
        ));
    }
    if new_password != confirm_password {
        return Err(ApiError::bad_request(
            "New password and confirm password do not match",
        ));
    }

    let user = state
        .users
        .find_by_id(me.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !verify_password_async(old_password, user.password_hash).await? {
        warn!("password change with wrong old password");
        return Err(ApiError::bad_request("Invalid old password"));
    }

    let digest = hash_password_async(new_password).await?;
    state.users.set_password(user.id, &digest).await?;

    info!("password changed");
    Ok(ApiResponse::ok(json!({}), "Password changed successfully"))
}

#[instrument(skip(state, me, payload), fields(user_id = %me.id))]
pub async fn update_details(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    ApiJson(payload): ApiJson<UpdateDetailsRequest>,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let mut changes = UserChanges::default();

    if let Some(name) = payload.name {
        if is_blank(Some(&name)) {
            return Err(ApiError::bad_request("Name cannot be empty"));
        }
        changes.name = Some(name.trim().to_string());
    }

    if let Some(username) = payload.username {
        let username = normalize_handle(&username);
        if username.is_empty() {
            return Err(ApiError::bad_request("Username cannot be empty"));
        }
        if username == me.username {
            return Err(ApiError::conflict("Username is the same as the current one"));
        }
        if state.users.find_by_username(&username).await?.is_some() {
            warn!(%username, "username already taken");
            return Err(ApiError::conflict("Username is already taken"));
        }
        changes.username = Some(username);
    }

    if let Some(email) = payload.email {
        let email = normalized_email(&email)?;
        if email == me.email {
            return Err(ApiError::conflict("Email is the same as the current one"));
        }
        if state.users.find_by_email(&email).await?.is_some() {
            warn!(%email, "email already taken");
            return Err(ApiError::conflict("Email is already taken"));
        }
        changes.email = Some(email);
    }

    if changes.is_empty() {
        return Err(ApiError::bad_request("At least one field is required"));
    }

    let updated = state
        .users
        .update_details(me.id, &changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!("account details updated");
    Ok(ApiResponse::ok(
        updated.into(),
        "Account details updated successfully",
    ))
}

#[instrument(skip(state, me, input), fields(user_id = %me.id))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    input: AvatarInput,
) -> Result<ApiResponse<PublicUser>, ApiError> {
    let AvatarInput(Some(upload)) = input else {
        return Err(ApiError::bad_request("Avatar file is missing"));
    };

    let stored = media::upload_avatar(&state, &upload).await?;
    drop(upload);

    let Some(updated) = state.users.set_avatar(me.id, &stored.url).await? else {
        media::discard_avatar(&state, &stored).await;
        return Err(ApiError::not_found("User not found"));
    };

    info!(key = %stored.key, "avatar updated");
    Ok(ApiResponse::ok(updated.into(), "Avatar updated successfully"))
}
