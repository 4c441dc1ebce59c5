use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::{config::JwtConfig, state::AppState, users::model::User};

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signing material for both credential kinds. Access and refresh tokens use
/// separate secrets, and the `kind` claim is checked on top of that.
#[derive(Clone)]
pub struct JwtKeys {
    access: KeyPair,
    refresh: KeyPair,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            access: KeyPair::from_secret(&cfg.access_secret),
            refresh: KeyPair::from_secret(&cfg.refresh_secret),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::from_secs((cfg.access_ttl_minutes.max(0) as u64) * 60),
            refresh_ttl: Duration::from_secs((cfg.refresh_ttl_minutes.max(0) as u64) * 60),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign(
        &self,
        user_id: Uuid,
        kind: TokenKind,
        username: Option<String>,
        email: Option<String>,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            jti: Uuid::new_v4(),
            username,
            email,
        };
        let token = encode(&Header::default(), &claims, &self.keys(kind).encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user: &User) -> anyhow::Result<String> {
        self.sign(
            user.id,
            TokenKind::Access,
            Some(user.username.clone()),
            Some(user.email.clone()),
        )
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign(user_id, TokenKind::Refresh, None, None)
    }

    fn verify(&self, token: &str, kind: TokenKind) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation)?;
        if data.claims.kind != kind {
            anyhow::bail!("expected {:?} token, got {:?}", kind, data.claims.kind);
        }
        debug!(user_id = %data.claims.sub, kind = ?kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> anyhow::Result<Claims> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        self.verify(token, TokenKind::Refresh)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.jwt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn make_keys() -> JwtKeys {
        JwtKeys::from_config(&testing::jwt_config())
    }

    fn user() -> User {
        testing::user_record("alice", "a@x.com")
    }

    #[test]
    fn sign_and_verify_access_token() {
        let keys = make_keys();
        let user = user();
        let token = keys.sign_access(&user).expect("sign access");
        let claims = keys.verify_access(&token).expect("verify token");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.email.as_deref(), Some("a@x.com"));
    }

    #[test]
    fn sign_and_verify_refresh_token() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_refresh(user_id).expect("sign refresh");
        let claims = keys.verify_refresh(&token).expect("verify refresh");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.kind, TokenKind::Refresh);
        assert!(claims.username.is_none());
    }

    #[test]
    fn tokens_signed_back_to_back_differ() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let a = keys.sign_refresh(user_id).expect("sign refresh");
        let b = keys.sign_refresh(user_id).expect("sign refresh");
        assert_ne!(a, b);
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let keys = make_keys();
        let user = user();
        let access = keys.sign_access(&user).expect("sign access");
        let refresh = keys.sign_refresh(user.id).expect("sign refresh");
        assert!(keys.verify_refresh(&access).is_err());
        assert!(keys.verify_access(&refresh).is_err());
    }

    #[test]
    fn kind_is_checked_even_with_shared_secret() {
        let mut cfg = testing::jwt_config();
        cfg.refresh_secret = cfg.access_secret.clone();
        let keys = JwtKeys::from_config(&cfg);
        let refresh = keys.sign_refresh(Uuid::new_v4()).expect("sign refresh");
        let err = keys.verify_access(&refresh).unwrap_err();
        assert!(err.to_string().contains("Access"));
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys();
        let mut cfg = testing::jwt_config();
        cfg.issuer = "bad-iss".into();
        cfg.audience = "bad-aud".into();
        let bad_keys = JwtKeys::from_config(&cfg);
        let token = good_keys.sign_access(&user()).expect("sign access");
        assert!(bad_keys.verify_access(&token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut cfg = testing::jwt_config();
        cfg.access_ttl_minutes = 0;
        let keys = JwtKeys::from_config(&cfg);
        // default validation leeway is 60s; push exp further into the past
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: now - 600,
            exp: now - 300,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
            kind: TokenKind::Access,
            jti: Uuid::new_v4(),
            username: None,
            email: None,
        };
        let token = encode(&Header::default(), &claims, &keys.access.encoding).unwrap();
        assert!(keys.verify_access(&token).is_err());
    }
}
