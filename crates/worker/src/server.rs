//! Worker bootstrap: wires config, store, executor and routes together and
//! serves the API.

use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::WorkerConfig;
use crate::executor::{CommandExecutor, ProgramRegistry};
use crate::routes::{api_routes, AppState};
use crate::store::{self, ArtifactStore};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api/v1", api_routes(state))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(config: WorkerConfig) -> anyhow::Result<()> {
    let store = Arc::new(
        ArtifactStore::open(&config.workspace_dir)
            .await
            .with_context(|| format!("opening workspace {}", config.workspace_dir.display()))?,
    );
    let registry = ProgramRegistry::scan(&config.program_dir)
        .await
        .with_context(|| format!("scanning program directory {}", config.program_dir.display()))?;
    let executor = Arc::new(CommandExecutor::new(store.clone(), registry));

    store::spawn_sweeper(store.clone(), config.retention);

    let router = build_router(AppState { store, executor });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, workspace = %config.workspace_dir.display(), "worker listening");

    axum::serve(listener, router).await?;
    Ok(())
}
