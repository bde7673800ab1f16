//! HTTP Routes
//!
//! - GET / - Greeting
//! - GET /test - Connectivity check
//! - POST /upload_file - XBRL package upload (multipart: file, websocket_user_id)
//! - POST /upload_json_file - xBRL-JSON upload (multipart: file, websocket_user_id)
//! - POST /switch_mode - Assistant mode switch (form: websocket_user_id, new_mode)
//! - POST /upload - Earlier upload variant (multipart: file, optional websocket_user_id)

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    Form, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::error::{DevResult, DevServerError};
use super::state::DevState;
use crate::chat::ServerFrame;
use crate::upload::AssistantMode;

/// Fields of an upload form
#[derive(Default)]
struct UploadForm {
    file_name: Option<String>,
    bytes: Option<Bytes>,
    session_id: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> DevResult<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| DevServerError::Validation(e.to_string()))?
        {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("file") => {
                    form.file_name = field.file_name().map(str::to_string);
                    form.bytes = Some(
                        field
                            .bytes()
                            .await
                            .map_err(|e| DevServerError::Validation(e.to_string()))?,
                    );
                }
                Some("websocket_user_id") => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| DevServerError::Validation(e.to_string()))?;
                    if !text.trim().is_empty() {
                        form.session_id = Some(text.trim().to_string());
                    }
                }
                other => {
                    tracing::debug!(field = ?other, "Ignoring unknown form field");
                }
            }
        }

        Ok(form)
    }

    fn file(&self) -> DevResult<(&str, &Bytes)> {
        let bytes = self
            .bytes
            .as_ref()
            .ok_or_else(|| DevServerError::Validation("file is required".to_string()))?;
        Ok((self.file_name.as_deref().unwrap_or("upload"), bytes))
    }

    fn session_id(&self) -> DevResult<&str> {
        self.session_id
            .as_deref()
            .ok_or_else(|| DevServerError::Validation("websocket_user_id is required".to_string()))
    }
}

/// Placeholder conversion result in xBRL-JSON shape
fn converted_document(file_name: &str, size: usize) -> Value {
    json!({
        "documentInfo": {
            "documentType": "https://xbrl.org/2021/xbrl-json",
            "source": file_name,
            "sizeBytes": size,
        },
        "facts": {},
    })
}

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Disclosure Explorer development backend" }))
}

/// GET /test
pub async fn test_endpoint() -> Json<Value> {
    tracing::info!("Test endpoint called");
    Json(json!({ "status": "ok", "message": "Test endpoint working" }))
}

/// POST /upload_file
///
/// Accepts an XBRL package and answers with a stub conversion. The session's
/// assistant switches to the converted document.
pub async fn upload_file(
    State(state): State<Arc<DevState>>,
    multipart: Multipart,
) -> DevResult<Json<Value>> {
    let form = UploadForm::read(multipart).await?;
    let session_id = form.session_id()?;
    let (file_name, bytes) = form.file()?;

    tracing::info!(session_id = %session_id, file = %file_name, size = bytes.len(), "XBRL upload");
    state.set_mode(session_id, AssistantMode::ConvertedXbrl).await;

    Ok(Json(json!({
        "message": "XBRL File uploaded & converted successfully",
        "json_data": converted_document(file_name, bytes.len()),
    })))
}

/// POST /upload_json_file
///
/// Accepts an xBRL-JSON document, switches the session to it and tells the
/// session's chat socket, if connected.
pub async fn upload_json_file(
    State(state): State<Arc<DevState>>,
    multipart: Multipart,
) -> DevResult<Json<Value>> {
    let form = UploadForm::read(multipart).await?;
    let session_id = form.session_id()?;
    let (file_name, bytes) = form.file()?;

    serde_json::from_slice::<Value>(bytes).map_err(|e| {
        DevServerError::BadRequest(format!("{} is not valid JSON: {}", file_name, e))
    })?;

    tracing::info!(session_id = %session_id, file = %file_name, size = bytes.len(), "JSON upload");
    state.set_mode(session_id, AssistantMode::UserJson).await;

    let notified = state
        .hub
        .send_to(
            session_id,
            ServerFrame::PersonalMessage {
                message: format!("Loaded {}. Answers now come from your document.", file_name),
            },
        )
        .await;
    if !notified {
        tracing::debug!(session_id = %session_id, "No socket to notify");
    }

    Ok(Json(json!({
        "message": "JSON file uploaded successfully",
        "user_id": session_id,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SwitchModeForm {
    pub websocket_user_id: String,
    pub new_mode: String,
}

/// POST /switch_mode
pub async fn switch_mode(
    State(state): State<Arc<DevState>>,
    Form(form): Form<SwitchModeForm>,
) -> DevResult<Json<Value>> {
    let mode: AssistantMode = form.new_mode.parse().map_err(DevServerError::BadRequest)?;
    let session_id = form.websocket_user_id.trim();
    if session_id.is_empty() {
        return Err(DevServerError::Validation(
            "websocket_user_id is required".to_string(),
        ));
    }

    state.set_mode(session_id, mode).await;
    state
        .hub
        .send_to(
            session_id,
            ServerFrame::PersonalMessage {
                message: format!("Switched to {} mode", mode),
            },
        )
        .await;

    Ok(Json(json!({ "message": format!("Switched to {} mode", mode) })))
}

/// POST /upload
///
/// Earlier upload variant: the session id is optional and echoed back, minted
/// here when absent.
pub async fn legacy_upload(
    State(state): State<Arc<DevState>>,
    multipart: Multipart,
) -> DevResult<Json<Value>> {
    let form = UploadForm::read(multipart).await?;
    let (file_name, bytes) = form.file()?;
    let session_id = form
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::info!(session_id = %session_id, file = %file_name, "Legacy upload");
    state
        .set_mode(&session_id, AssistantMode::ConvertedXbrl)
        .await;

    Ok(Json(json!({
        "user_id": session_id,
        "json_data": converted_document(file_name, bytes.len()),
    })))
}
