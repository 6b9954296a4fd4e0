//! File upload preprocessing
//!
//! Before each call the adapter scans audio/video/file parts: inline bytes
//! and plain URLs are uploaded to the file API and the part is rewritten to
//! a provider-file reference. Returned file ids are cached in a process-
//! local [`FileStore`] with a 48-hour TTL.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;

use super::config::GeminiConfig;
use super::types::CreateFileResponse;
use crate::error::AiError;
use crate::types::{ChatMessage, MediaSource};

/// Lifetime of provider file references.
pub const FILE_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// A cached provider file reference.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub uri: String,
    pub mime: Option<String>,
    pub size: Option<u64>,
    pub expires_at: DateTime<Utc>,
}

impl FileRecord {
    /// Whether the reference has outlived its TTL.
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Process-local cache of provider-issued file references.
///
/// Entries expire after [`FILE_TTL`] and are evicted by an explicit
/// [`FileStore::clean`]; there is no background sweeper.
#[derive(Default)]
pub struct FileStore {
    entries: RwLock<HashMap<String, FileRecord>>,
}

impl FileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an uploaded file.
    pub fn insert(&self, file_id: String, uri: String, mime: Option<String>, size: Option<u64>) {
        let record = FileRecord {
            uri,
            mime,
            size,
            expires_at: Utc::now() + chrono::Duration::from_std(FILE_TTL).expect("ttl fits"),
        };
        self.entries
            .write()
            .expect("file store poisoned")
            .insert(file_id, record);
    }

    /// Look up a live reference.
    pub fn get(&self, file_id: &str) -> Option<FileRecord> {
        self.entries
            .read()
            .expect("file store poisoned")
            .get(file_id)
            .filter(|r| !r.is_expired())
            .cloned()
    }

    /// Evict expired entries, returning how many were removed.
    pub fn clean(&self) -> usize {
        let mut entries = self.entries.write().expect("file store poisoned");
        let before = entries.len();
        entries.retain(|_, record| !record.is_expired());
        before - entries.len()
    }

    /// Number of live and expired entries currently held.
    pub fn len(&self) -> usize {
        self.entries.read().expect("file store poisoned").len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A freshly uploaded file.
#[derive(Debug, Clone)]
pub(crate) struct UploadedFile {
    pub file_id: String,
    pub uri: Option<String>,
    pub mime: Option<String>,
    pub size: u64,
}

/// Upload `data` to the file API.
pub(crate) async fn upload_bytes(
    http: &reqwest::Client,
    config: &GeminiConfig,
    data: Vec<u8>,
    mime: &str,
    name: Option<&str>,
    purpose: Option<&str>,
) -> Result<UploadedFile, AiError> {
    let url = format!(
        "{}/upload/{}/files?uploadType=multipart",
        config.base_url.trim_end_matches('/'),
        config.api_version
    );

    let size = data.len() as u64;
    let file_part = reqwest::multipart::Part::bytes(data)
        .file_name(name.unwrap_or("upload").to_string())
        .mime_str(mime)
        .map_err(|e| AiError::invalid_request(format!("invalid MIME type {mime}: {e}")))?;
    let form = reqwest::multipart::Form::new()
        .part("file", file_part)
        .text("mime_type", mime.to_string())
        .text("purpose", purpose.unwrap_or("general").to_string());

    let response = http
        .post(&url)
        .header("X-Goog-Api-Key", config.api_key.expose_secret())
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AiError::wrap(
            "file upload failed",
            super::error::classify_http_error(status.as_u16(), &body, &config.model),
        ));
    }

    let parsed: CreateFileResponse = response.json().await?;
    let file = parsed
        .file
        .ok_or_else(|| AiError::internal("file upload response has no file record"))?;
    let file_id = file
        .name
        .as_deref()
        .map(|n| n.strip_prefix("files/").unwrap_or(n).to_string())
        .ok_or_else(|| AiError::internal("file upload response has no file name"))?;

    tracing::debug!(file_id = %file_id, size, "uploaded media to the file API");
    Ok(UploadedFile {
        file_id,
        uri: file.uri,
        mime: file.mime_type.or_else(|| Some(mime.to_string())),
        size,
    })
}

/// Rewrite every uploadable media source in `messages` to a provider-file
/// reference, uploading as needed and caching the results in `store`.
pub(crate) async fn preprocess_messages(
    http: &reqwest::Client,
    config: &GeminiConfig,
    store: &FileStore,
    messages: &mut [ChatMessage],
) -> Result<(), AiError> {
    for message in messages.iter_mut() {
        for part in message.parts.iter_mut() {
            let (name, purpose) = match part {
                crate::types::Part::File { name, purpose, .. } => {
                    (name.clone(), purpose.clone())
                }
                _ => (None, None),
            };
            let Some(source) = part.media_source_mut() else {
                continue;
            };
            if !source.needs_upload() {
                continue;
            }

            let (data, mime) = match source {
                MediaSource::Bytes { data, mime } => (
                    std::mem::take(data),
                    mime.clone()
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                ),
                MediaSource::Url { url } => {
                    let response = http.get(url.as_str()).send().await?;
                    if !response.status().is_success() {
                        return Err(AiError::invalid_request(format!(
                            "fetching {url} for upload failed with status {}",
                            response.status()
                        )));
                    }
                    let mime = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string)
                        .or_else(|| mime_guess::from_path(url.as_str()).first_raw().map(str::to_string))
                        .unwrap_or_else(|| "application/octet-stream".to_string());
                    (response.bytes().await?.to_vec(), mime)
                }
                MediaSource::ProviderFile { .. } => continue,
            };

            let uploaded = upload_bytes(
                http,
                config,
                data,
                &mime,
                name.as_deref(),
                purpose.as_deref(),
            )
            .await?;
            store.insert(
                uploaded.file_id.clone(),
                uploaded.uri.clone().unwrap_or_default(),
                uploaded.mime.clone(),
                Some(uploaded.size),
            );
            *source = MediaSource::ProviderFile {
                file_id: uploaded.file_id,
                uri: uploaded.uri,
            };
        }
    }
    Ok(())
}
