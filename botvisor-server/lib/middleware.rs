//! Middleware components for the botvisor server.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use botvisor_core::BotvisorError;

use crate::{state::AppState, ServerError, ServerResult};

//--------------------------------------------------------------------------------------------------
// Middleware Functions
//--------------------------------------------------------------------------------------------------

/// Requires the API key as a bearer token on every request that is not a `GET`.
///
/// Passes everything through when the server has no key, which only happens in development mode.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> ServerResult<Response> {
    let Some(key) = state.get_config().get_key() else {
        return Ok(next.run(req).await);
    };

    if req.method() == Method::GET {
        return Ok(next.run(req).await);
    }

    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if provided != Some(key.as_str()) {
        return Err(ServerError::Botvisor(BotvisorError::Unauthorized(
            "missing or invalid API key".to_string(),
        )));
    }

    Ok(next.run(req).await)
}

/// Log incoming requests
pub async fn logging_middleware(req: Request<Body>, next: Next) -> impl IntoResponse {
    let method = req.method().clone();
    let uri = req.uri().clone();

    tracing::info!("request: {} {}", method, uri);

    let response = next.run(req).await;

    tracing::info!("response: {} {}: {}", method, uri, response.status());

    response
}
