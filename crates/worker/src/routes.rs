//! HTTP surface of the worker.
//!
//! Every non-file response is a JSON `{message}` body; expected failures map
//! to 404 (missing artifact or unknown program) and command failures surface
//! the program's diagnostic text verbatim with a 500.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use cubeflow_proto::{InvocationRequest, Message};
use tracing::info;

use crate::executor::{CommandExecutor, ExecError};
use crate::store::{ArtifactStore, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ArtifactStore>,
    pub executor: Arc<CommandExecutor>,
}

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(Message::new(message))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound("File not found".to_string()),
            StoreError::InvalidName(_) => ApiError::BadRequest(e.to_string()),
            StoreError::InvalidFormat { .. } => ApiError::Internal(e.to_string()),
            StoreError::Io(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ExecError> for ApiError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::UnknownProgram(name) => {
                ApiError::NotFound(format!("unknown program: {name}"))
            }
            // the diagnostic goes out verbatim, nothing else
            ExecError::CommandFailed { diagnostic, .. } => ApiError::Internal(diagnostic),
            ExecError::Store(e) => ApiError::from(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/files", post(upload_files))
        .route("/files/{name}", get(download_file))
        .route("/files/{name}", delete(delete_file))
        .route("/files/{name}/label", get(file_label))
        .route("/commands", post(run_command))
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Message>, ApiError> {
    let mut stored = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field
            .file_name()
            .or(field.name())
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("upload field has no name".to_string()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;

        state.store.put(&name, &bytes).await?;
        stored += 1;
    }

    info!(files = stored, "upload complete");
    Ok(Json(Message::new("Upload complete")))
}

async fn download_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Vec<u8>, ApiError> {
    Ok(state.store.get(&name).await?)
}

async fn delete_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Message>, ApiError> {
    state.store.delete(&name).await?;
    Ok(Json(Message::new("File deleted")))
}

async fn file_label(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(state.store.label(&name).await?))
}

async fn run_command(
    State(state): State<AppState>,
    Json(request): Json<InvocationRequest>,
) -> Result<Json<Message>, ApiError> {
    state.executor.run(&request).await?;
    Ok(Json(Message::new("Command executed successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ProgramRegistry;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const LABEL: &str = "Object = IsisCube\n  Group = Instrument\n    Summing = 2\n  End_Group\nEnd_Object\nEnd\n";

    async fn app() -> (tempfile::TempDir, tempfile::TempDir, Router) {
        let workspace = tempfile::tempdir().unwrap();
        let bin_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ArtifactStore::open(workspace.path()).await.unwrap());
        let registry = ProgramRegistry::scan(bin_dir.path()).await.unwrap();
        let executor = Arc::new(CommandExecutor::new(store.clone(), registry));
        let router = api_routes(AppState { store, executor });
        (workspace, bin_dir, router)
    }

    fn multipart_body(boundary: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, content) in files {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}\"\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let (_ws, _bin, router) = app().await;
        let boundary = "cubeflow-test-boundary";
        let body = multipart_body(boundary, &[("left.cub", b"left"), ("right.cub", b"right")]);

        let response = router
            .clone()
            .oneshot(
                Request::post("/files")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(Request::get("/files/right.cub").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"right");
    }

    #[tokio::test]
    async fn missing_file_is_a_404_with_message_body() {
        let (_ws, _bin, router) = app().await;
        let response = router
            .oneshot(Request::get("/files/absent.cub").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let message: Message = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(message.message, "File not found");
    }

    #[tokio::test]
    async fn delete_of_missing_file_is_a_404() {
        let (_ws, _bin, router) = app().await;
        let response = router
            .oneshot(
                Request::delete("/files/absent.cub")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn label_endpoint_returns_nested_json() {
        let (_ws, _bin, router) = app().await;
        let boundary = "cubeflow-test-boundary";
        let body = multipart_body(boundary, &[("tile.cub", LABEL.as_bytes())]);
        router
            .clone()
            .oneshot(
                Request::post("/files")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = router
            .oneshot(
                Request::get("/files/tile.cub/label")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let label: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(label["IsisCube"]["Instrument"]["Summing"], "2");
    }

    #[tokio::test]
    async fn unknown_program_is_a_404() {
        let (_ws, _bin, router) = app().await;
        let request = serde_json::json!({
            "program": "definitely-not-allowed",
            "args": { "from": "x.cub" }
        });

        let response = router
            .oneshot(
                Request::post("/commands")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(request.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
