// HTTP routes: metrics exposition, version, 404 fallback

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::aggregator::BillingAggregator;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) aggregator: Arc<BillingAggregator>,
}

pub fn app(aggregator: Arc<BillingAggregator>, metrics_path: &str) -> Router {
    let state = AppState { aggregator };
    let mut router = Router::new()
        .route("/", get(http::metrics_handler)) // GET /
        .route("/version", get(http::version_handler)); // GET /version
    if metrics_path != "/" && metrics_path != "/version" {
        router = router.route(metrics_path, get(http::metrics_handler)); // GET /metrics
    }
    router
        .fallback(http::not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
