//! Router configuration for the botvisor server.

use std::any::Any;

use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::{handler, middleware as app_middleware, state::AppState, ServerError};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Create a new router with the given state
pub fn create_router(state: AppState) -> Router {
    let rest_api = Router::new()
        .route("/health", get(handler::health))
        .route("/units", get(handler::list_units).post(handler::create_unit))
        .route("/units/stop-all", post(handler::stop_all_units))
        .route("/units/reconcile", post(handler::reconcile_units))
        .route("/units/{name}/start", post(handler::start_unit))
        .route("/units/{name}/stop", post(handler::stop_unit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::auth_middleware,
        ));

    Router::new()
        .nest("/api/v1", rest_api)
        .layer(middleware::from_fn(app_middleware::logging_middleware))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!("request handler panicked: {}", detail);

    ServerError::InternalError("request handler panicked".to_string()).into_response()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
