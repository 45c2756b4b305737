//! Serve command - runs the vusermgr HTTP management server.

use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use vusermgr::{Engine, ErrorKind, User};

use crate::cli::ServeArgs;
use crate::store::open_engine;

/// Shared application state
#[derive(Clone)]
struct AppState {
    engine: Engine,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Engine error mapped onto an HTTP response.
///
/// Only caller mistakes are described to the caller; everything else is logged and
/// answered with an opaque body.
struct ApiError(vusermgr::Error);

impl From<vusermgr::Error> for ApiError {
    fn from(err: vusermgr::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0.kind() {
            ErrorKind::InvalidUser => (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string()),
            ErrorKind::PathEscape => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Directory tree leaves the user root".to_string(),
            ),
            ErrorKind::ConcurrentSync | ErrorKind::Closed => {
                tracing::warn!(error = %self.0, "Request refused");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
            _ => {
                tracing::error!(error = ?self.0, module = self.0.module(), "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Run the vusermgr server
pub async fn run(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(&args.engine).await?;

    // Bring the credential file up to date before accepting requests
    engine.sync().await?;

    let app = router(engine.clone());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let sync_task = spawn_periodic_sync(engine.clone(), args.sync_interval);

    tracing::info!("vusermgr listening on http://{local_addr}");
    println!("vusermgr listening on http://{local_addr}");
    println!();
    println!("Available endpoints:");
    println!("  GET    /health - Health check");
    println!("  GET    /users  - List users");
    println!("  POST   /users  - Create a user or change its password");
    println!("  DELETE /users  - Delete a user");
    println!("  POST   /sync   - Regenerate the credential file");
    println!();
    println!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = sync_task {
        task.abort();
    }
    engine.close().await?;

    println!("Server shut down");
    Ok(())
}

fn router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/users",
            get(handle_list_users)
                .post(handle_save_user)
                .delete(handle_delete_user),
        )
        .route("/sync", post(handle_sync))
        .layer(middleware::from_fn(log_requests))
        .with_state(AppState { engine })
}

/// Regenerate the credential file on a fixed interval. Ticks never overlap.
fn spawn_periodic_sync(engine: Engine, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }
    tracing::info!(interval_secs, "Periodic sync enabled");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; startup already synced
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match engine.sync().await {
                Ok(()) => tracing::debug!("Periodic sync completed"),
                Err(e) if e.is_closed() => break,
                Err(e) => tracing::warn!(error = %e, "Periodic sync failed"),
            }
        }
    }))
}

async fn shutdown_signal() {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to set up signal handlers, waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
        _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown..."),
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "Handled request"
    );
    response
}

/// Handler for GET /health
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Handler for GET /users
async fn handle_list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.engine.list().await?))
}

/// Handler for POST /users
async fn handle_save_user(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> Result<StatusCode, ApiError> {
    state.engine.save(&user).await?;
    Ok(StatusCode::OK)
}

/// Handler for DELETE /users
async fn handle_delete_user(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete(&user).await?;
    Ok(StatusCode::OK)
}

/// Handler for POST /sync
async fn handle_sync(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.engine.sync().await?;
    Ok(StatusCode::OK)
}
