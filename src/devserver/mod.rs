//! Development Backend
//!
//! A stand-in for the disclosure backend, built with Axum. It speaks the same
//! REST and WebSocket contract as the real service so the client can be run
//! and tested without the conversion or AI services behind it.
//!
//! # Endpoints
//!
//! - `GET /` and `GET /test` - Liveness
//! - `POST /upload_file` - XBRL package upload, stub conversion
//! - `POST /upload_json_file` - xBRL-JSON upload
//! - `POST /switch_mode` - Assistant mode switch
//! - `POST /upload` - Earlier upload variant
//! - `GET /ws/:user_id` - Chat socket
//!
//! # Example
//!
//! ```rust,no_run
//! use disclosure_explorer::config::DevServerConfig;
//! use disclosure_explorer::devserver::{serve, DevState};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     serve(Arc::new(DevState::new(DevServerConfig::default()))).await?;
//!     Ok(())
//! }
//! ```

mod error;
mod routes;
mod socket;
mod state;

pub use error::{DevResult, DevServerError};
pub use state::{DevState, SocketHub};

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use socket::websocket_handler;

/// Upload size limit (50 MB)
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Build the router with all routes and middleware
pub fn build_router(state: Arc<DevState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/", get(routes::root))
        .route("/test", get(routes::test_endpoint))
        .route("/upload_file", post(routes::upload_file))
        .route("/upload_json_file", post(routes::upload_json_file))
        .route("/switch_mode", post(routes::switch_mode))
        .route("/upload", post(routes::legacy_upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .route("/ws/:user_id", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// An empty origin list allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Start the development backend
pub async fn serve(state: Arc<DevState>) -> DevResult<()> {
    let addr = state.config.addr();
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Development backend listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| DevServerError::Server(e.to_string()))?;

    tracing::info!("Development backend shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatSession, ChatSessionConfig, ReconnectPolicy, Role, ServerFrame};
    use crate::session::SessionIdentity;
    use crate::test_support::spawn_router;
    use crate::upload::{AssistantMode, UploadClient, UploadKind, UploadRequest};
    use axum::{
        body::Body,
        http::{Request, Response, StatusCode},
    };
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "disclosure-test-boundary";

    fn create_test_app() -> (Router, Arc<DevState>) {
        let state = Arc::new(DevState::default());
        (build_router(Arc::clone(&state)), state)
    }

    /// (field name, file name, content)
    fn multipart(fields: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, file_name, content) in fields {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(content.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn with_uri(mut request: Request<Body>, uri: &str) -> Request<Body> {
        *request.uri_mut() = uri.parse().unwrap();
        request
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_and_test_endpoints() {
        let (app, _) = create_test_app();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_upload_file_converts() {
        let (app, state) = create_test_app();

        let request = multipart(&[
            ("file", Some("report.zip"), "PK\x03\x04"),
            ("websocket_user_id", None, "s1"),
        ]);
        let response = app
            .oneshot(with_uri(request, "/upload_file"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["json_data"]["documentInfo"]["source"], "report.zip");
        assert_eq!(body["json_data"]["documentInfo"]["sizeBytes"], 4);
        assert_eq!(state.mode("s1").await, AssistantMode::ConvertedXbrl);
    }

    #[tokio::test]
    async fn test_upload_file_requires_session_id() {
        let (app, _) = create_test_app();

        let request = multipart(&[("file", Some("report.zip"), "PK")]);
        let response = app
            .oneshot(with_uri(request, "/upload_file"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("websocket_user_id"));
    }

    #[tokio::test]
    async fn test_upload_json_file_rejects_invalid_json() {
        let (app, state) = create_test_app();

        let request = multipart(&[
            ("file", Some("facts.json"), "{not json"),
            ("websocket_user_id", None, "s1"),
        ]);
        let response = app
            .oneshot(with_uri(request, "/upload_json_file"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.mode("s1").await, AssistantMode::Preloaded);
    }

    #[tokio::test]
    async fn test_upload_json_file_notifies_socket() {
        let (app, state) = create_test_app();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.hub.register("s1", tx).await;

        let request = multipart(&[
            ("file", Some("facts.json"), r#"{"facts": {}}"#),
            ("websocket_user_id", None, "s1"),
        ]);
        let response = app
            .oneshot(with_uri(request, "/upload_json_file"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user_id"], "s1");
        assert_eq!(state.mode("s1").await, AssistantMode::UserJson);
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerFrame::PersonalMessage { message }) if message.contains("facts.json")
        ));
    }

    #[tokio::test]
    async fn test_switch_mode() {
        let (app, state) = create_test_app();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/switch_mode")
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(Body::from("websocket_user_id=s1&new_mode=user_json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.mode("s1").await, AssistantMode::UserJson);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/switch_mode")
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(Body::from("websocket_user_id=s1&new_mode=telepathy"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("telepathy"));
        assert_eq!(state.mode("s1").await, AssistantMode::UserJson);
    }

    #[tokio::test]
    async fn test_legacy_upload_mints_session_id() {
        let (app, _) = create_test_app();

        let request = multipart(&[("file", Some("filing.zip"), "PK")]);
        let response = app.oneshot(with_uri(request, "/upload")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(!body["user_id"].as_str().unwrap().is_empty());
        assert_eq!(body["json_data"]["documentInfo"]["source"], "filing.zip");
    }

    #[tokio::test]
    async fn test_cors_layer_from_origins() {
        let state = Arc::new(DevState::default());
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header("Origin", "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:5173"
        );
    }

    #[tokio::test]
    async fn test_client_against_dev_backend() {
        let state = Arc::new(DevState::default());
        let addr = spawn_router(build_router(Arc::clone(&state))).await;
        let identity = Arc::new(SessionIdentity::in_memory());

        // Upload an XBRL package
        let client = UploadClient::new(
            format!("http://{}", addr),
            Duration::from_secs(5),
            Arc::clone(&identity),
        )
        .unwrap();
        let outcome = client
            .submit(UploadRequest::Xbrl {
                file_name: "report.zip".to_string(),
                bytes: b"PK\x03\x04".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.download_name(), "report.json");
        assert_eq!(client.status().await.kind, UploadKind::Xbrl);

        // Chat in the converted document's mode
        let session = ChatSession::spawn(
            ChatSessionConfig::new(format!("ws://{}", addr), ReconnectPolicy::Manual),
            Arc::clone(&identity),
        );
        let mut rx = session.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.is_open()))
            .await
            .unwrap()
            .unwrap();

        assert!(session.send("What is ESRS E1?"));
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| {
                s.messages
                    .last()
                    .is_some_and(|m| m.role == Role::Assistant && m.complete)
            }),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();

        assert_eq!(
            snapshot.messages.last().unwrap().content,
            "[converted_xbrl] You said: What is ESRS E1?"
        );
        session.shutdown().await;
    }
}
