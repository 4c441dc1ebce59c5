use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState, uploads::TempUpload};

/// An avatar that made it to the media host.
#[derive(Debug, Clone)]
pub struct StoredAvatar {
    pub key: String,
    pub url: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Push a spooled avatar to object storage and resolve its public URL.
/// A host that cannot hand back a URL is treated as a failed upload.
pub async fn upload_avatar(st: &AppState, upload: &TempUpload) -> Result<StoredAvatar, ApiError> {
    let ext = ext_from_mime(&upload.content_type)
        .ok_or_else(|| ApiError::bad_request("Avatar must be an image"))?;
    if upload.size == 0 {
        return Err(ApiError::bad_request("Avatar file is empty"));
    }

    let key = format!("avatars/{}.{}", Uuid::new_v4(), ext);
    let body = upload.read().await?;
    st.storage
        .put_object(&key, body, &upload.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let Some(url) = st.storage.object_url(&key) else {
        warn!(%key, "storage returned no url for avatar");
        delete_quietly(st, &key).await;
        return Err(ApiError::internal("Error while uploading avatar"));
    };
    info!(%key, size = upload.size, "avatar uploaded");
    Ok(StoredAvatar { key, url })
}

/// Best-effort removal of an avatar whose owning write never happened.
pub async fn discard_avatar(st: &AppState, avatar: &StoredAvatar) {
    delete_quietly(st, &avatar.key).await;
}

async fn delete_quietly(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, %key, "failed to delete orphaned avatar");
    }
}
