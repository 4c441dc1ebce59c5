use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password::PasswordDigest;

/// User record as stored. Never serialized directly; handlers answer with
/// `PublicUser`.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub username: String,              // lowercase, unique
    pub email: String,                 // lowercase, unique
    pub password_hash: String,         // argon2 PHC string
    pub avatar: Option<String>,
    pub refresh_token: Option<String>, // the one live refresh credential
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Sanitized record: no password hash, no refresh token.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            username: u.username,
            email: u.email,
            avatar: u.avatar,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Input for `UserStore::insert`. Fields are expected to be normalized
/// already (see `users::validation`).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: PasswordDigest,
    pub avatar: Option<String>,
}

/// Partial update of the account details; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.username.is_none() && self.email.is_none()
    }
}
