//! Multipart bodies land in temp files under the upload directory before
//! they are pushed to the media host. A `TempUpload` owns its file and
//! removes it when dropped, so every exit path of a handler cleans up.

use std::{collections::HashMap, path::Path};

use anyhow::Context;
use axum::extract::{multipart::Field, Multipart};
use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::ApiError;

pub const AVATAR_FIELD: &str = "avatar";

#[derive(Debug)]
pub struct TempUpload {
    file: NamedTempFile,
    pub content_type: String,
    pub size: u64,
}

impl TempUpload {
    pub async fn from_field(mut field: Field<'_>, dir: &Path) -> Result<Self, ApiError> {
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let file_name = field.file_name().map(|s| s.to_string());

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create upload dir {}", dir.display()))?;
        let spool_dir = dir.to_path_buf();
        let (file, writer) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let file = tempfile::Builder::new()
                .prefix("upload-")
                .tempfile_in(&spool_dir)
                .context("create temp file")?;
            let writer = file.reopen().context("reopen temp file")?;
            Ok((file, writer))
        })
        .await
        .context("temp file task panicked")??;
        let mut out = tokio::fs::File::from_std(writer);

        let mut size = 0u64;
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            out.write_all(&chunk).await.context("write temp file")?;
        }
        out.flush().await.context("flush temp file")?;

        debug!(
            path = %file.path().display(),
            file_name = file_name.as_deref().unwrap_or("-"),
            size,
            "upload spooled to disk"
        );
        Ok(Self {
            file,
            content_type,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub async fn read(&self) -> anyhow::Result<Bytes> {
        let data = tokio::fs::read(self.path())
            .await
            .with_context(|| format!("read temp file {}", self.path().display()))?;
        Ok(Bytes::from(data))
    }
}

/// Text fields plus at most one `avatar` file from a multipart body.
#[derive(Debug, Default)]
pub struct AvatarForm {
    pub fields: HashMap<String, String>,
    pub avatar: Option<TempUpload>,
}

impl AvatarForm {
    pub async fn parse(mut multipart: Multipart, dir: &Path) -> Result<Self, ApiError> {
        let mut form = AvatarForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(|s| s.to_string()) else {
                continue;
            };
            if name == AVATAR_FIELD {
                if form.avatar.is_some() {
                    return Err(ApiError::bad_request("Only one avatar file is allowed"));
                }
                form.avatar = Some(TempUpload::from_field(field, dir).await?);
            } else if field.file_name().is_some() {
                return Err(ApiError::bad_request(format!("Unexpected file field: {name}")));
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    pub fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }
}
