//! HTTP API server for the wake listener
//!
//! Exposes the [`Bridge`] to a UI process on loopback.

pub mod health;
pub mod wake;

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::bridge::Bridge;
use crate::config::ApiServerConfig;

/// API server
pub struct ApiServer {
    bridge: Bridge,
    addr: SocketAddr,
}

impl ApiServer {
    /// Create a server for `bridge`
    #[must_use]
    pub fn new(bridge: Bridge, config: &ApiServerConfig) -> Self {
        Self {
            bridge,
            addr: SocketAddr::new(config.bind, config.port),
        }
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(bridge: Bridge) -> Router {
        Router::new()
            .nest("/wake", wake::router(bridge))
            .merge(health::router())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(addr = %self.addr, "API server listening");

        axum::serve(listener, Self::router(self.bridge))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
