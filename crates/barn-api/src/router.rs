/*!
 * HTTP router and server entry point.
 */
use std::future::Future;
use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::management;
use crate::observingconditions;
use crate::safetymonitor;
use crate::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(management::root))
        // Management API
        .route("/management/apiversions", get(management::api_versions))
        .route("/management/v1/description", get(management::description))
        .route(
            "/management/v1/configureddevices",
            get(management::configured_devices),
        )
        // Device APIs
        .route(
            "/api/v1/safetymonitor/:device_id/:operation",
            get(safetymonitor::handle).put(safetymonitor::handle),
        )
        .route(
            "/api/v1/observingconditions/:device_id/:operation",
            get(observingconditions::handle).put(observingconditions::handle),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Alpaca API listening");
    let app = create_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
