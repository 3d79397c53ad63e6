//! REST surface over the state store.
//!
//! - `GET /states`: every point
//! - `GET /states/{key}`: one point
//! - `PUT /states/{key}`: external command (JSON value), answered with 202
//! - `GET /scenarios`: scenario catalog

mod handlers;
mod types;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::scenario::ScenarioInfo;
use crate::store::SharedStore;

pub use types::{ErrorResponse, StateEntry};

/// State shared by all request handlers.
///
/// The store handle is internally synchronized; commands written through it
/// wake the tick loop.
pub struct AppState {
    pub store: SharedStore,
    /// Catalog snapshot taken at startup.
    pub catalog: Vec<ScenarioInfo>,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/states", get(handlers::list_states))
        .route(
            "/states/{key}",
            get(handlers::get_state).put(handlers::put_state),
        )
        .route("/scenarios", get(handlers::list_scenarios))
        .with_state(state)
}

/// Binds to `addr` and serves the API until the task is dropped.
///
/// # Errors
///
/// Returns the bind or accept error.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
