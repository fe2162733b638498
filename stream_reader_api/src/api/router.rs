use crate::api::handlers::{
    get_messages, get_stream_stats, health, list_connections, list_streams, list_vhosts,
};
use axum::body::Body;
use axum::routing::get;
use axum::Router;
use http::Request;
use std::sync::Arc;
use stream_reader::manager::ConnectionManager;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info_span;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn create_router(manager: Arc<ConnectionManager>) -> Router {
    let api = Router::new()
        .route("/connections", get(list_connections))
        .route("/vhosts", get(list_vhosts))
        .route("/streams", get(list_streams))
        .route(
            "/streams/{connection_id}/{vhost}/{stream_name}/stats",
            get(get_stream_stats),
        )
        .route(
            "/streams/{connection_id}/{vhost}/{stream_name}/messages",
            get(get_messages),
        );

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .with_state(manager)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default();

                info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id
                )
            }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}
