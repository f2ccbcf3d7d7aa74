use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{
    api::{self, control_key::require_control_key},
    app::App,
    websocket::status_stream::status_stream_handler,
};

pub fn router(app: App) -> Router {
    let control_router = api::control::routes().route_layer(middleware::from_fn_with_state(
        app.clone(),
        require_control_key,
    ));

    Router::new()
        .route("/liveness", get(api::health_checks::ok))
        .route("/readiness", get(api::health_checks::ready))
        .route("/ws/jobs", get(status_stream_handler))
        .merge(control_router)
        .with_state(app)
        .layer(TraceLayer::new_for_http())
}
