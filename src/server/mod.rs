//! # HTTP Print Server
//!
//! Accepts text and images over HTTP and queues them on a [`PrintService`].
//!
//! ## Usage
//!
//! ```bash
//! peripage serve -m 00:15:83:15:BC:5F -p a6p --listen 0.0.0.0:11001 --secret hunter2
//! ```
//!
//! ```bash
//! curl -X POST 'http://localhost:11001/print_ascii?secret=hunter2&print_break=1' \
//!     --data-binary @notes.txt
//! curl -X POST 'http://localhost:11001/print_image?secret=hunter2' -F image=@cat.png
//! curl http://localhost:11001/status
//! ```

mod handlers;
mod state;

pub use handlers::print::PrintQuery;
pub use state::{AppState, DEFAULT_BREAK_SIZE, ServerConfig};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::{PeripageError, Result};
use crate::service::PrintService;
use crate::transport::RfcommConnector;

/// Upload limit for `/print_image`.
const IMAGE_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Build the router around already-running state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/print_ascii", post(handlers::print::print_ascii))
        .route(
            "/print_image",
            post(handlers::print::print_image).layer(DefaultBodyLimit::max(IMAGE_BODY_LIMIT)),
        )
        .route("/status", get(handlers::status::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the print service and serve HTTP until Ctrl-C.
///
/// ## Example
///
/// ```no_run
/// use peripage::printer::ProfileId;
/// use peripage::server::{serve, ServerConfig};
///
/// # async fn example() -> Result<(), peripage::error::PeripageError> {
/// let config = ServerConfig::new("00:15:83:15:BC:5F", ProfileId::A6p);
/// serve(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn serve(config: ServerConfig) -> Result<()> {
    let service = PrintService::with_session(config.session(RfcommConnector::default()), config.service);

    let listener = match tokio::net::TcpListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            service.stop().await;
            return Err(PeripageError::Connection(format!(
                "Failed to bind to {}: {}",
                config.listen_addr, e
            )));
        }
    };

    tracing::info!(
        listen = %config.listen_addr,
        printer = %config.address,
        profile = %config.profile,
        secret = config.secret.is_some(),
        "Print server listening"
    );

    let state = Arc::new(AppState::new(config, service));
    let served = axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    state.service.stop().await;

    served.map_err(|e| PeripageError::Transport(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
