//! Media uploads backed by blob storage.

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use plinth_core::defaults::{FILENAME_MAX_LENGTH, NAME_MAX_LENGTH};
use plinth_core::validation::validate_optional;
use plinth_core::{
    detect_content_type, new_v7, sanitize_filename, validate_file, CreateMediaRequest, Error,
    JobType, ListMediaRequest, Media, MediaRepository, Page, PostRepository, Result, User,
};
use plinth_db::{compute_content_hash, generate_storage_path, Database};

use super::{enqueue, ensure_owner_or_moderator, forbidden, require};

const CAPTION_MAX_LENGTH: usize = 2_000;

/// A file received from a client.
#[derive(Debug)]
pub struct UploadInput {
    pub filename: String,
    pub claimed_type: String,
    pub data: Vec<u8>,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
}

#[derive(Clone)]
pub struct MediaService {
    db: Database,
    max_upload_bytes: usize,
}

impl MediaService {
    pub fn new(db: Database, max_upload_bytes: usize) -> Self {
        Self {
            db,
            max_upload_bytes,
        }
    }

    /// Validate, store and record an upload. The blob is removed again when
    /// the row cannot be written.
    #[instrument(skip(self, actor, input), fields(subsystem = "api", component = "media", op = "upload", size_bytes = input.data.len()))]
    pub async fn upload(&self, actor: &User, input: UploadInput) -> Result<Media> {
        if !actor.role.can_author() {
            return Err(forbidden("subscribers cannot upload media"));
        }

        let check = validate_file(&input.filename, &input.data, self.max_upload_bytes);
        if !check.allowed {
            return Err(Error::InvalidInput(
                check
                    .block_reason
                    .unwrap_or_else(|| "file rejected".to_string()),
            ));
        }

        let content_type = detect_content_type(&input.filename, &input.data, &input.claimed_type);
        let filename = sanitize_filename(&input.filename);
        if filename.is_empty() || filename.chars().count() > FILENAME_MAX_LENGTH {
            return Err(Error::InvalidInput("filename is empty or too long".to_string()));
        }
        let alt_text = validate_optional("alt_text", input.alt_text.as_deref(), NAME_MAX_LENGTH)?;
        let caption = validate_optional("caption", input.caption.as_deref(), CAPTION_MAX_LENGTH)?;

        let storage = self.db.storage()?;
        let id = new_v7();
        let storage_path = generate_storage_path(&id);
        storage.write(&storage_path, &input.data).await?;

        let created = self
            .db
            .media
            .create(CreateMediaRequest {
                id,
                uploader_id: actor.id,
                filename,
                content_type,
                size_bytes: input.data.len() as i64,
                content_hash: compute_content_hash(&input.data),
                storage_path: storage_path.clone(),
                alt_text,
                caption,
            })
            .await;

        match created {
            Ok(media) => {
                info!(media_id = %media.id, content_type = %media.content_type, "Media uploaded");
                Ok(media)
            }
            Err(e) => {
                if let Err(cleanup) = storage.delete(&storage_path).await {
                    warn!(path = %storage_path, error = %cleanup, "Failed to remove orphaned blob");
                }
                Err(e)
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Media> {
        require(self.db.media.get(id).await?, "Media", id)
    }

    pub async fn list(&self, req: ListMediaRequest) -> Result<Page<Media>> {
        self.db.media.list(req).await
    }

    pub async fn update(
        &self,
        actor: &User,
        id: Uuid,
        alt_text: Option<&str>,
        caption: Option<&str>,
    ) -> Result<Media> {
        let media = self.get(id).await?;
        ensure_owner_or_moderator(actor, media.uploader_id)?;
        let alt_text = validate_optional("alt_text", alt_text, NAME_MAX_LENGTH)?;
        let caption = validate_optional("caption", caption, CAPTION_MAX_LENGTH)?;
        self.db
            .media
            .update(id, alt_text.as_deref(), caption.as_deref())
            .await
    }

    /// Metadata plus the stored bytes.
    pub async fn download(&self, id: Uuid) -> Result<(Media, Vec<u8>)> {
        let media = self.get(id).await?;
        let data = self.db.storage()?.read(&media.storage_path).await?;
        Ok((media, data))
    }

    /// Delete the record now and the blob in the background.
    pub async fn delete(&self, actor: &User, id: Uuid) -> Result<()> {
        let media = self.get(id).await?;
        ensure_owner_or_moderator(actor, media.uploader_id)?;

        let detached = self.db.posts.clear_featured_media(id).await?;
        let media = self.db.media.delete(id).await?;
        enqueue(
            &self.db,
            JobType::MediaCleanup,
            json!({ "storage_path": media.storage_path }),
        )
        .await;

        info!(media_id = %id, detached, "Media deleted");
        Ok(())
    }
}

/// `Content-Disposition` value for a download.
pub fn content_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("inline; filename=\"{}\"", safe)
}
