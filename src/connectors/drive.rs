// Google Drive connector
// Upload, list, download and delete files in the user's Drive

use anyhow::Context;
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::PathRejection,
        DefaultBodyLimit, Multipart, Path, State,
    },
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use super::api_url;
use crate::auth::AuthManager;
use crate::error::ApiError;
use crate::http_client::ProviderClient;

/// Name used when Drive metadata carries no usable file name
const DEFAULT_DOWNLOAD_NAME: &str = "downloaded_file";

/// Largest upload accepted from callers
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub struct DriveConnector {
    auth: Arc<AuthManager>,
    http: Arc<ProviderClient>,
    api_base: String,
    download_dir: PathBuf,
}

impl DriveConnector {
    pub fn new(
        auth: Arc<AuthManager>,
        http: Arc<ProviderClient>,
        api_base: String,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            auth,
            http,
            api_base,
            download_dir,
        }
    }

    pub fn auth_manager(&self) -> Arc<AuthManager> {
        self.auth.clone()
    }

    /// Multipart upload; returns the new file id
    pub async fn upload(
        &self,
        file_name: &str,
        content: Bytes,
        content_type: Option<&str>,
    ) -> Result<Option<String>, ApiError> {
        let token = self.auth.get_valid_token().await?;

        let metadata = Part::text(json!({ "name": file_name }).to_string())
            .mime_str("application/json; charset=UTF-8")
            .context("Invalid metadata content type")?;
        let file = Part::bytes(content.to_vec())
            .file_name(file_name.to_string())
            .mime_str(content_type.unwrap_or("application/octet-stream"))
            .context("Invalid file content type")?;
        let form = Form::new().part("metadata", metadata).part("file", file);

        let url = api_url(&self.api_base, &["upload", "drive", "v3", "files"])?;
        let request = self
            .http
            .client()
            .post(url)
            .query(&[("uploadType", "multipart")])
            .bearer_auth(&token.access_token)
            .multipart(form);

        let created = self.http.send_json(request, "File upload failed").await?;
        let file_id = created.get("id").and_then(Value::as_str).map(str::to_string);

        tracing::info!("Uploaded {} to Drive (id: {:?})", file_name, file_id);
        Ok(file_id)
    }

    pub async fn list_files(&self) -> Result<Value, ApiError> {
        let token = self.auth.get_valid_token().await?;
        let url = api_url(&self.api_base, &["drive", "v3", "files"])?;
        let request = self.http.client().get(url).bearer_auth(&token.access_token);

        let listing = self
            .http
            .send_json(request, "Failed to retrieve files")
            .await?;
        Ok(listing.get("files").cloned().unwrap_or_else(|| json!([])))
    }

    /// Save a file's content into the download directory; returns the local name
    pub async fn download(&self, file_id: &str) -> Result<String, ApiError> {
        let token = self.auth.get_valid_token().await?;
        let url = api_url(&self.api_base, &["drive", "v3", "files", file_id])?;

        let metadata = self
            .http
            .send_json(
                self.http
                    .client()
                    .get(url.clone())
                    .query(&[("fields", "name")])
                    .bearer_auth(&token.access_token),
                "Failed to get file metadata",
            )
            .await?;
        let file_name = local_file_name(metadata.get("name").and_then(Value::as_str));

        let content = self
            .http
            .send(
                self.http
                    .client()
                    .get(url)
                    .query(&[("alt", "media")])
                    .bearer_auth(&token.access_token),
                "File download failed",
            )
            .await?
            .bytes()
            .await
            .context("Failed to read file content")?;

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.download_dir.display()))?;
        let path = self.download_dir.join(&file_name);
        tokio::fs::write(&path, &content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!("Downloaded {} bytes to {}", content.len(), path.display());
        Ok(file_name)
    }

    pub async fn delete(&self, file_id: &str) -> Result<(), ApiError> {
        let token = self.auth.get_valid_token().await?;
        let url = api_url(&self.api_base, &["drive", "v3", "files", file_id])?;
        let request = self.http.client().delete(url).bearer_auth(&token.access_token);

        self.http.send(request, "File deletion failed").await?;
        Ok(())
    }
}

/// Base name of a remote file, safe to join onto the download directory
fn local_file_name(remote: Option<&str>) -> String {
    remote
        .and_then(|name| std::path::Path::new(name).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DOWNLOAD_NAME)
        .to_string()
}

pub fn routes(state: Arc<DriveConnector>) -> Router {
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/files", get(list_files_handler))
        .route("/download/:file_id", get(download_handler))
        .route("/delete/:file_id", delete(delete_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// POST /upload - multipart form with a `file` field
async fn upload_handler(
    State(state): State<Arc<DriveConnector>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::ValidationError(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::ValidationError(format!("Failed to read file: {}", e)))?;

        let file_id = state
            .upload(&file_name, content, content_type.as_deref())
            .await?;

        return Ok(Json(json!({
            "message": "File uploaded successfully!",
            "file_id": file_id
        })));
    }

    Err(ApiError::ValidationError(
        "Multipart field 'file' is required".to_string(),
    ))
}

async fn list_files_handler(
    State(state): State<Arc<DriveConnector>>,
) -> Result<Json<Value>, ApiError> {
    let files = state.list_files().await?;
    Ok(Json(json!({ "files": files })))
}

async fn download_handler(
    State(state): State<Arc<DriveConnector>>,
    file_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(file_id) = file_id?;
    let file_name = state.download(&file_id).await?;
    Ok(Json(json!({
        "message": "File downloaded successfully!",
        "file_name": file_name
    })))
}

async fn delete_handler(
    State(state): State<Arc<DriveConnector>>,
    file_id: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(file_id) = file_id?;
    state.delete(&file_id).await?;
    Ok(Json(json!({ "message": "File deleted successfully!" })))
}
