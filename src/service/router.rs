use super::metrics::metrics_get;
use super::snapshot::handlers::{alerts_get, autocomplete_get, label_names_get, label_values_get};
use crate::service::Service;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub fn create_router(service: Service) -> Router<()> {
    let router = Router::new()
        .route("/", get(|| async { "amview" }))
        .route("/healthz", get(|| async { "healthy" }))
        .route("/metrics", get(metrics_get))
        .route("/alerts.json", get(alerts_get))
        .route("/autocomplete.json", get(autocomplete_get))
        .route("/labelNames.json", get(label_names_get))
        .route("/labelValues.json", get(label_values_get))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    router.with_state(service)
}
