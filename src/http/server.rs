//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap the business router in the resilience pipeline
//! - Mount `/status` and, when enabled, the admin API outside that pipeline
//! - Wire up ambient middleware (request id, tracing, request timeout)
//! - Apply live configuration updates while serving
//! - Drain in-flight requests on shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::admin_router;
use crate::config::{AdminConfig, ServiceConfig};
use crate::health::get_status;
use crate::http::middleware::{
    fault_injection_middleware, idempotency_middleware, principal_middleware,
    read_cache_middleware, server_timing_middleware,
};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::{wait_for, Services};

/// State for the status and admin handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub admin: Arc<AdminConfig>,
}

/// HTTP server hosting a business router behind the resilience layers.
pub struct AppServer {
    router: Router,
    services: Services,
}

impl AppServer {
    /// `routes` is the business router; every route in it gets the full pipeline.
    pub fn new(config: &ServiceConfig, services: Services, routes: Router) -> Self {
        let state = AppState {
            services: services.clone(),
            admin: Arc::new(config.admin.clone()),
        };
        let router = Self::build_router(config, state, routes);
        Self { router, services }
    }

    #[allow(deprecated)]
    fn build_router(config: &ServiceConfig, state: AppState, routes: Router) -> Router {
        let services = &state.services;

        // Innermost first: the last layer added runs first.
        let pipeline = routes
            .layer(middleware::from_fn_with_state(
                services.cache.clone(),
                read_cache_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                services.idempotency.clone(),
                idempotency_middleware,
            ))
            .layer(middleware::from_fn(principal_middleware))
            .layer(middleware::from_fn_with_state(
                services.faults.clone(),
                fault_injection_middleware,
            ))
            .layer(middleware::from_fn(server_timing_middleware));

        let mut router = Router::new()
            .route("/status", get(get_status))
            .with_state(state.clone());
        if config.admin.enabled {
            router = router.merge(admin_router(state));
        }

        router
            .merge(pipeline)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Serve on `listener` until `shutdown` fires, then drain.
    ///
    /// Configurations arriving on `config_updates` are applied live where
    /// possible; today that is the fault injection settings.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServiceConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let faults = self.services.faults.clone();
        let reload = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                faults.update(config.fault_injection);
                tracing::info!("Configuration reload applied; other sections take effect on restart");
            }
        });

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(wait_for(shutdown))
            .await?;

        reload.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
