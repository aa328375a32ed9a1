//! Attachment store: file content in [`ObjectStorage`], metadata rows in
//! `attachments`, both joined to letters through a random token rather than
//! the letter id.

use std::collections::HashMap;
use std::path::Path;

use diesel::{prelude::*, PgConnection};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Attachment, NewAttachment};
use crate::schema::attachments;
use crate::storage::ObjectStorage;

pub const TOKEN_LENGTH: usize = 48;
const MAX_FILENAME_CHARS: usize = 255;
const MAX_EXTENSION_CHARS: usize = 10;
const MAX_CONTENT_TYPE_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("letter has no attachment token")]
    NoToken,
    #[error("no attachment recorded for token")]
    Missing,
    #[error("attachment file is missing from storage")]
    FileMissing,
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<AttachmentError> for AppError {
    fn from(value: AttachmentError) -> Self {
        match value {
            AttachmentError::NoToken => AppError::not_found_with("letter has no attachment"),
            AttachmentError::Missing => AppError::not_found_with("attachment not found"),
            AttachmentError::FileMissing => AppError::not_found_with("attachment file not found"),
            AttachmentError::Storage(err) => AppError::storage(format!("{err:#}")),
            AttachmentError::Database(err) => AppError::from(err),
        }
    }
}

/// Content that has been written to storage but not yet recorded.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub storage_key: String,
    pub filename: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub checksum: String,
}

pub fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Keeps only the final path component and strips control characters.
pub fn sanitize_filename(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .filter(|ch| !ch.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A fresh storage key that never embeds the user-supplied name.
pub fn storage_key_for(filename: &str) -> String {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_CHARS
                && ext.chars().all(|ch| ch.is_ascii_alphanumeric())
        });

    match extension {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4().simple()),
        None => Uuid::new_v4().simple().to_string(),
    }
}

/// The quoted form is ASCII-only; `filename*` carries the exact name.
pub fn attachment_content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if !ch.is_ascii() || ch.is_ascii_control() => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(filename, percent_encoding::NON_ALPHANUMERIC);
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

/// Client-declared media type as stored. Parameters are dropped when the
/// full value does not fit the column; anything still too long is discarded
/// and the type is guessed from the filename on download.
pub fn normalize_content_type(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() <= MAX_CONTENT_TYPE_CHARS {
        return Some(trimmed.to_string());
    }
    let essence = trimmed.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() || essence.chars().count() > MAX_CONTENT_TYPE_CHARS {
        None
    } else {
        Some(essence.to_string())
    }
}

pub fn content_type_for(attachment: &Attachment) -> String {
    attachment.content_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(&attachment.filename)
            .first_or_octet_stream()
            .to_string()
    })
}

/// Writes the content under a new key. Nothing is recorded in the database.
pub async fn save(
    storage: &dyn ObjectStorage,
    bytes: Vec<u8>,
    original_filename: &str,
    content_type: Option<String>,
) -> Result<StoredFile, AttachmentError> {
    let filename = sanitize_filename(original_filename);
    let content_type = normalize_content_type(content_type);
    let storage_key = storage_key_for(&filename);
    let checksum = hex::encode(Sha256::digest(&bytes));
    let size_bytes = bytes.len() as i64;

    storage
        .put_object(&storage_key, bytes, content_type.clone())
        .await
        .map_err(AttachmentError::Storage)?;

    debug!(key = %storage_key, filename = %filename, size_bytes, "attachment content stored");

    Ok(StoredFile {
        storage_key,
        filename,
        size_bytes,
        content_type,
        checksum,
    })
}

/// Compensation for a `save` whose owning letter was never committed.
pub async fn discard(storage: &dyn ObjectStorage, stored: &StoredFile) {
    match storage.delete_object(&stored.storage_key).await {
        Ok(_) => info!(key = %stored.storage_key, "discarded orphaned attachment content"),
        Err(err) => warn!(
            key = %stored.storage_key,
            error = %format!("{err:#}"),
            "failed to discard orphaned attachment content"
        ),
    }
}

pub fn record(
    conn: &mut PgConnection,
    token: &str,
    stored: &StoredFile,
) -> QueryResult<Attachment> {
    let row = NewAttachment {
        id: Uuid::new_v4(),
        token: token.to_string(),
        filename: stored.filename.clone(),
        storage_key: stored.storage_key.clone(),
        size_bytes: stored.size_bytes,
        content_type: stored.content_type.clone(),
        checksum: stored.checksum.clone(),
    };

    diesel::insert_into(attachments::table)
        .values(&row)
        .get_result(conn)
}

pub fn fetch(conn: &mut PgConnection, token: &str) -> QueryResult<Option<Attachment>> {
    attachments::table
        .filter(attachments::token.eq(token))
        .order((attachments::created_at.asc(), attachments::id.asc()))
        .first(conn)
        .optional()
}

/// First attachment per token, for decorating listings.
pub fn fetch_many(
    conn: &mut PgConnection,
    tokens: &[String],
) -> QueryResult<HashMap<String, Attachment>> {
    if tokens.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<Attachment> = attachments::table
        .filter(attachments::token.eq_any(tokens))
        .order((attachments::created_at.asc(), attachments::id.asc()))
        .load(conn)?;

    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        map.entry(row.token.clone()).or_insert(row);
    }
    Ok(map)
}

pub async fn read(
    storage: &dyn ObjectStorage,
    attachment: &Attachment,
) -> Result<Vec<u8>, AttachmentError> {
    storage
        .get_object(&attachment.storage_key)
        .await
        .map_err(AttachmentError::Storage)?
        .ok_or(AttachmentError::FileMissing)
}

/// Removes every file and row for the token. A file that is already gone
/// counts as removed; any other storage failure aborts before rows are
/// touched so the metadata still points at what remains.
pub async fn delete(
    conn: &mut PgConnection,
    storage: &dyn ObjectStorage,
    token: &str,
) -> Result<usize, AttachmentError> {
    let rows: Vec<Attachment> = attachments::table
        .filter(attachments::token.eq(token))
        .load(conn)?;

    for row in &rows {
        let removed = storage
            .delete_object(&row.storage_key)
            .await
            .map_err(AttachmentError::Storage)?;
        if !removed {
            warn!(
                token = %token,
                key = %row.storage_key,
                "attachment file already absent; removing its record"
            );
        }
    }

    let deleted = diesel::delete(attachments::table.filter(attachments::token.eq(token)))
        .execute(conn)?;
    Ok(deleted)
}
