use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;
use crate::storage::{Storage, StorageClient};
use crate::users::repo::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    /// Connect to Postgres and the media host. Returns the pool as well so
    /// the caller can run migrations on it.
    pub async fn init(config: AppConfig) -> anyhow::Result<(Self, PgPool)> {
        let config = Arc::new(config);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let users = Arc::new(PgUserStore::new(db.clone())) as Arc<dyn UserStore>;

        Ok((Self::from_parts(users, config, storage), db))
    }

    pub fn from_parts(
        users: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            users,
            config,
            storage,
        }
    }
}
