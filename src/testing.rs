//! In-memory collaborators and request helpers for router-level tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    auth::password::PasswordDigest,
    config::{AppConfig, HttpConfig, JwtConfig, StorageConfig},
    state::AppState,
    storage::StorageClient,
    users::{
        model::{NewUser, User, UserChanges},
        repo::{StoreError, StoreResult, UserStore},
    },
};

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        access_secret: "test-access-secret".into(),
        refresh_secret: "test-refresh-secret".into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
        access_ttl_minutes: 5,
        refresh_ttl_minutes: 60,
    }
}

pub fn app_config(upload_dir: &std::path::Path) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        jwt: jwt_config(),
        storage: StorageConfig {
            endpoint: None,
            bucket: "fake".into(),
            access_key: String::new(),
            secret_key: String::new(),
            region: "us-east-1".into(),
            public_base_url: None,
        },
        http: HttpConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origin: None,
            cookie_secure: true,
            upload_dir: upload_dir.to_path_buf(),
            static_dir: upload_dir.join("static"),
            max_upload_bytes: 1024 * 1024,
        },
    }
}

pub fn user_record(username: &str, email: &str) -> User {
    let now = OffsetDateTime::now_utc();
    User {
        id: Uuid::new_v4(),
        name: username.to_string(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: String::new(),
        avatar: None,
        refresh_token: None,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    rows: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn by_username(&self, username: &str) -> Option<User> {
        self.rows
            .lock()
            .unwrap()
            .values()
            .find(|u| u.username == username)
            .cloned()
    }

    fn find(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.rows.lock().unwrap().values().find(|u| pred(u)).cloned()
    }

    fn modify(&self, id: Uuid, f: impl FnOnce(&mut User)) -> Option<User> {
        let mut rows = self.rows.lock().unwrap();
        let user = rows.get_mut(&id)?;
        f(user);
        user.updated_at = OffsetDateTime::now_utc();
        Some(user.clone())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.get(id))
    }

    async fn find_by_login(&self, identifier: &str) -> StoreResult<Option<User>> {
        Ok(self.find(|u| u.username == identifier || u.email == identifier))
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        Ok(self.find(|u| u.username == username || u.email == email))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.find(|u| u.username == username))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.find(|u| u.email == email))
    }

    async fn insert(&self, new: NewUser) -> StoreResult<User> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .values()
            .any(|u| u.username == new.username || u.email == new.email)
        {
            return Err(StoreError::Duplicate);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            username: new.username,
            email: new.email,
            password_hash: new.password.as_str().to_string(),
            avatar: new.avatar,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<()> {
        self.modify(id, |u| u.refresh_token = token.map(str::to_string));
        Ok(())
    }

    async fn set_password(&self, id: Uuid, password: &PasswordDigest) -> StoreResult<()> {
        self.modify(id, |u| u.password_hash = password.as_str().to_string());
        Ok(())
    }

    async fn update_details(&self, id: Uuid, changes: &UserChanges) -> StoreResult<Option<User>> {
        {
            let rows = self.rows.lock().unwrap();
            let clash = rows.values().any(|u| {
                u.id != id
                    && (changes.username.as_deref() == Some(u.username.as_str())
                        || changes.email.as_deref() == Some(u.email.as_str()))
            });
            if clash {
                return Err(StoreError::Duplicate);
            }
        }
        Ok(self.modify(id, |u| {
            if let Some(name) = &changes.name {
                u.name = name.clone();
            }
            if let Some(username) = &changes.username {
                u.username = username.clone();
            }
            if let Some(email) = &changes.email {
                u.email = email.clone();
            }
        }))
    }

    async fn set_avatar(&self, id: Uuid, url: &str) -> StoreResult<Option<User>> {
        Ok(self.modify(id, |u| u.avatar = Some(url.to_string())))
    }
}

/// Records uploads instead of talking to a media host.
#[derive(Default)]
pub struct FakeStorage {
    pub objects: Mutex<HashMap<String, Bytes>>,
    pub without_urls: bool,
}

impl FakeStorage {
    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn object_url(&self, key: &str) -> Option<String> {
        (!self.without_urls).then(|| format!("https://media.test/{}", key))
    }
}

pub struct TestApp {
    pub router: Router,
    pub users: Arc<InMemoryUserStore>,
    pub storage: Arc<FakeStorage>,
    pub upload_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_storage(FakeStorage::default())
    }

    pub fn with_storage(storage: FakeStorage) -> Self {
        let upload_dir = tempfile::tempdir().expect("temp upload dir");
        let users = Arc::new(InMemoryUserStore::default());
        let storage = Arc::new(storage);
        let state = AppState::from_parts(
            users.clone(),
            Arc::new(app_config(upload_dir.path())),
            storage.clone(),
        );
        let router = crate::app::build_app(state).expect("build app");
        Self {
            router,
            users,
            storage,
            upload_dir,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let res = self.router.clone().oneshot(req).await.expect("infallible");
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Files left behind in the upload directory.
    pub fn spooled_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().is_file())
                    .count()
            })
            .unwrap_or(0)
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestResponse {
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }

    /// `name=value` pair from a Set-Cookie header, ready for a Cookie header.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.set_cookies()
            .into_iter()
            .find(|c| c.starts_with(&format!("{name}=")))
            .and_then(|c| c.split(';').next().map(str::to_string))
    }
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub const BOUNDARY: &str = "----accountd-test-boundary";

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
        }
    }
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    out
}

pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}
