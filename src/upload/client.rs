//! Upload REST Client
//!
//! HTTP client for the backend's filing endpoints.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::error::{UploadError, UploadResult};
use super::status::{AssistantMode, FileKind, UploadKind, UploadStatus};
use crate::config::BackendConfig;
use crate::session::{SessionId, SessionIdentity};

/// File name offered for the converted document when the upload had none
pub const DEFAULT_DOWNLOAD_NAME: &str = "corporate-filing.json";

/// A single upload action
#[derive(Debug, Clone)]
pub enum UploadRequest {
    /// Raw XBRL archive for server-side conversion
    Xbrl { file_name: String, bytes: Vec<u8> },
    /// Pre-converted JSON document
    Json { file_name: String, bytes: Vec<u8> },
    /// Use the backend's preloaded sample filing; sends no file
    Preloaded,
}

impl UploadRequest {
    /// Read a file from disk
    pub async fn from_path(path: impl AsRef<Path>, kind: FileKind) -> UploadResult<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| UploadError::Validation(format!("{:?} has no file name", path)))?;

        let bytes = tokio::fs::read(path).await.map_err(|e| UploadError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(match kind {
            FileKind::Xbrl => UploadRequest::Xbrl { file_name, bytes },
            FileKind::Json => UploadRequest::Json { file_name, bytes },
        })
    }

    /// Status this request produces on success
    pub fn kind(&self) -> UploadKind {
        match self {
            UploadRequest::Xbrl { .. } => UploadKind::Xbrl,
            UploadRequest::Json { .. } => UploadKind::Json,
            UploadRequest::Preloaded => UploadKind::Preloaded,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self {
            UploadRequest::Xbrl { file_name, .. } | UploadRequest::Json { file_name, .. } => {
                Some(file_name)
            }
            UploadRequest::Preloaded => None,
        }
    }

    fn path(&self) -> &'static str {
        match self {
            UploadRequest::Xbrl { .. } => "/upload_file",
            UploadRequest::Json { .. } => "/upload_json_file",
            UploadRequest::Preloaded => "/switch_mode",
        }
    }

    fn validate(&self) -> UploadResult<()> {
        match self {
            UploadRequest::Xbrl { file_name, bytes } | UploadRequest::Json { file_name, bytes } => {
                if file_name.trim().is_empty() {
                    return Err(UploadError::Validation("file name is empty".to_string()));
                }
                if bytes.is_empty() {
                    return Err(UploadError::Validation(format!("{} is empty", file_name)));
                }
                Ok(())
            }
            UploadRequest::Preloaded => Ok(()),
        }
    }
}

/// Successful upload result
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Server confirmation message
    pub message: Option<String>,
    /// Converted document, when the backend returned one
    pub json_data: Option<Value>,
    /// Status after this upload
    pub status: UploadStatus,
}

impl UploadOutcome {
    /// File name for saving the converted document
    ///
    /// `report.zip` becomes `report.json`; everything after the first dot is dropped.
    /// A name with nothing before its first dot (`.hidden`) gets the default name.
    pub fn download_name(&self) -> String {
        self.status
            .filename
            .as_deref()
            .and_then(|name| name.split('.').next())
            .filter(|stem| !stem.is_empty())
            .map(|stem| format!("{}.json", stem))
            .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string())
    }

    /// Pretty-printed converted document
    pub fn pretty_json(&self) -> Option<String> {
        self.json_data
            .as_ref()
            .and_then(|v| serde_json::to_string_pretty(v).ok())
    }

    /// Save the converted document
    pub async fn write_json(&self, path: impl AsRef<Path>) -> UploadResult<PathBuf> {
        let path = path.as_ref().to_path_buf();
        let json = self.pretty_json().ok_or_else(|| {
            UploadError::Validation("response contained no converted document".to_string())
        })?;

        tokio::fs::write(&path, json).await.map_err(|e| UploadError::Io {
            path: path.clone(),
            error: e.to_string(),
        })?;

        tracing::info!(path = ?path, "Saved converted filing");
        Ok(path)
    }
}

#[derive(Debug, Default, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    json_data: Option<Value>,
    #[serde(default)]
    user_id: Option<String>,
}

/// REST client for filing uploads and mode switches
pub struct UploadClient {
    client: Client,
    base_url: String,
    identity: Arc<SessionIdentity>,
    status: RwLock<UploadStatus>,
}

impl UploadClient {
    /// Create a client for `base_url` (e.g. "http://localhost:8000")
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        identity: Arc<SessionIdentity>,
    ) -> UploadResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            identity,
            status: RwLock::new(UploadStatus::default()),
        })
    }

    pub fn from_config(config: &BackendConfig, identity: Arc<SessionIdentity>) -> UploadResult<Self> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
            identity,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Current upload status
    pub async fn status(&self) -> UploadStatus {
        self.status.read().await.clone()
    }

    /// Submit an upload
    ///
    /// On success the status reflects the new source; on failure it is left
    /// untouched. Nothing is retried.
    pub async fn submit(&self, request: UploadRequest) -> UploadResult<UploadOutcome> {
        request.validate()?;

        let session_id = self.identity.session_id();
        let kind = request.kind();
        let filename = request.file_name().map(str::to_string);
        let url = format!("{}{}", self.base_url, request.path());

        tracing::info!(
            url = %url,
            session_id = %session_id,
            kind = ?kind,
            filename = ?filename,
            "Submitting upload"
        );

        let builder = match request {
            UploadRequest::Xbrl { file_name, bytes } => {
                let part = Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("application/octet-stream")?;
                self.client.post(&url).multipart(Self::form(part, &session_id))
            }
            UploadRequest::Json { file_name, bytes } => {
                let part = Part::bytes(bytes)
                    .file_name(file_name)
                    .mime_str("application/json")?;
                self.client.post(&url).multipart(Self::form(part, &session_id))
            }
            UploadRequest::Preloaded => self
                .client
                .post(&url)
                .form(&Self::mode_form(&session_id, AssistantMode::Preloaded)),
        };

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Upload request failed");
            UploadError::Transport(e)
        })?;
        let body = Self::read_body(response).await?;

        if let Some(user_id) = body.user_id.as_deref() {
            match SessionId::new(user_id) {
                Ok(id) => self.identity.adopt(id),
                Err(e) => tracing::warn!(error = %e, "Ignoring server-assigned session id"),
            }
        }

        let status = UploadStatus::new(kind, filename);
        *self.status.write().await = status.clone();

        tracing::info!(status = %status.describe(), "Upload succeeded");

        Ok(UploadOutcome {
            message: body.message,
            json_data: body.json_data,
            status,
        })
    }

    /// Switch the assistant to another document source
    pub async fn switch_mode(&self, mode: AssistantMode) -> UploadResult<()> {
        let session_id = self.identity.session_id();
        let url = format!("{}/switch_mode", self.base_url);

        tracing::info!(url = %url, session_id = %session_id, mode = %mode, "Switching mode");

        let response = self
            .client
            .post(&url)
            .form(&Self::mode_form(&session_id, mode))
            .send()
            .await?;
        Self::read_body(response).await?;

        Ok(())
    }

    fn form(part: Part, session_id: &SessionId) -> Form {
        Form::new()
            .part("file", part)
            .text("websocket_user_id", session_id.to_string())
    }

    fn mode_form(session_id: &SessionId, mode: AssistantMode) -> [(&'static str, String); 2] {
        [
            ("websocket_user_id", session_id.to_string()),
            ("new_mode", mode.as_str().to_string()),
        ]
    }

    /// Map a response into its decoded body, or the server's error message
    async fn read_body(response: Response) -> UploadResult<UploadResponse> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = error_message(&text).unwrap_or_else(|| "Upload failed".to_string());
            tracing::warn!(status = status.as_u16(), message = %message, "Backend rejected request");
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Ok(UploadResponse::default());
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(value @ Value::Object(_)) => {
                serde_json::from_value(value).map_err(|e| UploadError::Decode(e.to_string()))
            }
            Ok(other) => Err(UploadError::Decode(format!(
                "expected a JSON object, got {}",
                other
            ))),
            // Plain-text confirmations are accepted as the message
            Err(_) => Ok(UploadResponse {
                message: Some(text.trim().to_string()),
                ..Default::default()
            }),
        }
    }
}

/// Pull a readable message out of an error body
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return Some(trimmed.to_string());
    };

    ["error", "message", "detail"]
        .iter()
        .find_map(|key| value.get(key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_router, unused_addr};
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form as AxumForm, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client_for(base: String) -> (UploadClient, Arc<SessionIdentity>) {
        let identity = Arc::new(SessionIdentity::in_memory());
        let client = UploadClient::new(base, Duration::from_secs(5), Arc::clone(&identity)).unwrap();
        (client, identity)
    }

    fn xbrl(name: &str) -> UploadRequest {
        UploadRequest::Xbrl {
            file_name: name.to_string(),
            bytes: b"PK\x03\x04fake".to_vec(),
        }
    }

    async fn multipart_fields(mut multipart: Multipart) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let value = match file_name {
                Some(file_name) => file_name,
                None => field.text().await.unwrap(),
            };
            fields.insert(name, value);
        }
        fields
    }

    #[tokio::test]
    async fn test_xbrl_upload_sets_status_and_returns_document() {
        let router = Router::new().route(
            "/upload_file",
            post(|multipart: Multipart| async move {
                let fields = multipart_fields(multipart).await;
                assert_eq!(fields.get("file").map(String::as_str), Some("report.zip"));
                assert!(fields.contains_key("websocket_user_id"));
                Json(json!({"message": "ok", "json_data": {"foo": 1}}))
            }),
        );
        let addr = spawn_router(router).await;
        let (client, _) = client_for(format!("http://{}", addr));

        let outcome = client.submit(xbrl("report.zip")).await.unwrap();

        let expected = UploadStatus::new(UploadKind::Xbrl, Some("report.zip".to_string()));
        assert_eq!(outcome.status, expected);
        assert_eq!(client.status().await, expected);
        assert_eq!(outcome.message.as_deref(), Some("ok"));
        assert_eq!(outcome.json_data, Some(json!({"foo": 1})));
        assert_eq!(outcome.download_name(), "report.json");
    }

    #[tokio::test]
    async fn test_upload_sends_session_id() {
        let router = Router::new().route(
            "/upload_json_file",
            post(|multipart: Multipart| async move {
                let fields = multipart_fields(multipart).await;
                Json(json!({
                    "message": fields.get("websocket_user_id").cloned().unwrap_or_default(),
                }))
            }),
        );
        let addr = spawn_router(router).await;
        let (client, identity) = client_for(format!("http://{}", addr));
        let expected = identity.session_id();

        let outcome = client
            .submit(UploadRequest::Json {
                file_name: "filing.json".to_string(),
                bytes: br#"{"facts": []}"#.to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.status.kind, UploadKind::Json);
        assert_eq!(outcome.message.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_server_assigned_user_id_is_adopted() {
        let router = Router::new().route(
            "/upload_json_file",
            post(|| async { Json(json!({"message": "ok", "user_id": "server-42"})) }),
        );
        let addr = spawn_router(router).await;
        let (client, identity) = client_for(format!("http://{}", addr));

        client
            .submit(UploadRequest::Json {
                file_name: "filing.json".to_string(),
                bytes: b"{}".to_vec(),
            })
            .await
            .unwrap();

        assert_eq!(identity.session_id().as_str(), "server-42");
    }

    #[tokio::test]
    async fn test_rejection_keeps_previous_status() {
        let router = Router::new()
            .route(
                "/upload_file",
                post(|| async {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"error": "conversion service down"})),
                    )
                }),
            )
            .route(
                "/upload_json_file",
                post(|| async { Json(json!({"message": "ok"})) }),
            );
        let addr = spawn_router(router).await;
        let (client, _) = client_for(format!("http://{}", addr));

        client
            .submit(UploadRequest::Json {
                file_name: "first.json".to_string(),
                bytes: b"{}".to_vec(),
            })
            .await
            .unwrap();
        let before = client.status().await;

        let err = client.submit(xbrl("report.zip")).await.unwrap_err();
        match err {
            UploadError::Rejected { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "conversion service down");
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
        assert_eq!(client.status().await, before);
    }

    #[tokio::test]
    async fn test_rejection_without_body_uses_generic_message() {
        let router = Router::new().route("/upload_file", post(|| async { StatusCode::BAD_GATEWAY }));
        let addr = spawn_router(router).await;
        let (client, _) = client_for(format!("http://{}", addr));

        let err = client.submit(xbrl("report.zip")).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Rejected { status: 502, ref message } if message == "Upload failed"
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_status_untouched() {
        let addr = unused_addr().await;
        let (client, _) = client_for(format!("http://{}", addr));

        let err = client.submit(xbrl("report.zip")).await.unwrap_err();
        assert!(matches!(err, UploadError::Transport(_)));
        assert_eq!(client.status().await, UploadStatus::default());
    }

    #[tokio::test]
    async fn test_empty_file_is_blocked_locally() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/upload_file",
            post(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { StatusCode::OK }
            }),
        );
        let addr = spawn_router(router).await;
        let (client, _) = client_for(format!("http://{}", addr));

        let err = client
            .submit(UploadRequest::Xbrl {
                file_name: "report.zip".to_string(),
                bytes: Vec::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Validation(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_preloaded_switches_mode_without_file() {
        let router = Router::new().route(
            "/switch_mode",
            post(|AxumForm(form): AxumForm<HashMap<String, String>>| async move {
                assert_eq!(form.get("new_mode").map(String::as_str), Some("preloaded"));
                assert!(form.contains_key("websocket_user_id"));
                Json(json!({"message": "Mode switched to preloaded"}))
            }),
        );
        let addr = spawn_router(router).await;
        let (client, _) = client_for(format!("http://{}", addr));

        let outcome = client.submit(UploadRequest::Preloaded).await.unwrap();
        assert_eq!(outcome.status, UploadStatus::new(UploadKind::Preloaded, None));
        assert_eq!(outcome.download_name(), DEFAULT_DOWNLOAD_NAME);
    }

    #[tokio::test]
    async fn test_switch_mode_rejected() {
        let router = Router::new().route(
            "/switch_mode",
            post(|| async { (StatusCode::BAD_REQUEST, Json(json!({"detail": "Invalid mode"}))) }),
        );
        let addr = spawn_router(router).await;
        let (client, _) = client_for(format!("http://{}", addr));

        let err = client.switch_mode(AssistantMode::UserJson).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Rejected { status: 400, ref message } if message == "Invalid mode"
        ));
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annual-report.zip");
        std::fs::write(&path, b"archive").unwrap();

        let request = UploadRequest::from_path(&path, FileKind::Xbrl).await.unwrap();
        assert_eq!(request.file_name(), Some("annual-report.zip"));
        assert_eq!(request.kind(), UploadKind::Xbrl);

        let missing = UploadRequest::from_path(dir.path().join("nope.zip"), FileKind::Xbrl).await;
        assert!(matches!(missing, Err(UploadError::Io { .. })));
    }

    #[tokio::test]
    async fn test_write_json_pretty_prints() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = UploadOutcome {
            message: None,
            json_data: Some(json!({"foo": 1})),
            status: UploadStatus::new(UploadKind::Xbrl, Some("report.zip".to_string())),
        };

        let path = outcome
            .write_json(dir.path().join(outcome.download_name()))
            .await
            .unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written, "{\n  \"foo\": 1\n}");
    }

    #[test]
    fn test_download_name_variants() {
        let outcome = |name: Option<&str>| UploadOutcome {
            message: None,
            json_data: None,
            status: UploadStatus::new(UploadKind::Xbrl, name.map(str::to_string)),
        };

        assert_eq!(outcome(Some("report.zip")).download_name(), "report.json");
        assert_eq!(outcome(Some("esrs.2024.zip")).download_name(), "esrs.json");
        assert_eq!(outcome(Some("noext")).download_name(), "noext.json");
        assert_eq!(outcome(Some(".hidden")).download_name(), DEFAULT_DOWNLOAD_NAME);
        assert_eq!(outcome(None).download_name(), DEFAULT_DOWNLOAD_NAME);
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error": "boom"}"#).as_deref(), Some("boom"));
        assert_eq!(error_message(r#"{"detail": "bad"}"#).as_deref(), Some("bad"));
        assert_eq!(
            error_message(r#"{"error": [{"loc": "file"}]}"#).as_deref(),
            Some(r#"[{"loc":"file"}]"#)
        );
        assert_eq!(error_message("gateway timeout").as_deref(), Some("gateway timeout"));
        assert_eq!(error_message("  "), None);
        assert_eq!(error_message(r#"{"other": 1}"#), None);
    }
}
