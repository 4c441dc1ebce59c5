use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;

use crate::config::StorageConfig;

/// Third-party media host. Objects are addressed by key; `object_url`
/// returns the public URL clients should use, if the host exposes one.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    fn object_url(&self, key: &str) -> Option<String>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    public_base: Option<String>,
}

impl Storage {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        let mut loader = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()));
        if !cfg.access_key.is_empty() {
            loader = loader.credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ));
        }
        if let Some(endpoint) = &cfg.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut conf = S3ConfigBuilder::from(&shared);
        if let Some(endpoint) = &cfg.endpoint {
            conf = conf.endpoint_url(endpoint).force_path_style(true);
        }

        let public_base = match (&cfg.public_base_url, &cfg.endpoint) {
            (Some(base), _) => Some(base.trim_end_matches('/').to_string()),
            (None, Some(endpoint)) => Some(format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                cfg.bucket
            )),
            (None, None) => Some(format!(
                "https://{}.s3.{}.amazonaws.com",
                cfg.bucket, cfg.region
            )),
        };

        Ok(Self {
            client: Client::from_conf(conf.build()),
            bucket: cfg.bucket.clone(),
            public_base,
        })
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    fn object_url(&self, key: &str) -> Option<String> {
        self.public_base
            .as_ref()
            .map(|base| format!("{}/{}", base, key))
    }
}
