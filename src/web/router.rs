//! Web application router and middleware setup.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::web::config::WebConfig;
use crate::web::handlers::{self, ApiContext};

/// Create the main axum application with all routes and middleware.
pub fn create_app(config: &WebConfig, ctx: Arc<ApiContext>) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::index))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/history", get(handlers::get_history))
        .route("/api/events", get(handlers::get_events))
        .route(
            "/api/settings",
            get(handlers::get_settings).post(handlers::update_settings),
        )
        .route("/api/wifi/scan", post(handlers::wifi_scan))
        .route("/api/wifi/connect", post(handlers::wifi_connect))
        .route("/api/health", get(handlers::health_check))
        .with_state(ctx);

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReloadSignal;
    use crate::hw::sim::SimNetwork;
    use crate::state::SharedState;
    use crate::store::Store;

    fn test_context() -> Arc<ApiContext> {
        Arc::new(ApiContext {
            state: Arc::new(SharedState::new()),
            store: Arc::new(Store::open_in_memory().unwrap()),
            reload: ReloadSignal::new(),
            network: Arc::new(SimNetwork::new(true)),
        })
    }

    #[tokio::test]
    async fn app_builds_with_and_without_cors() {
        let _with_cors = create_app(&WebConfig::default(), test_context());
        let _without_cors = create_app(&WebConfig::default().with_cors(false), test_context());
    }
}
