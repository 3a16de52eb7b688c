//! Wires the request handler into an axum `Router`.
//!
//! The service has a fixed surface (`OPTIONS *`, `GET /robots.txt`,
//! `GET /ppx-server`, `GET /metadata/{key}`, `POST /publish`), and several
//! behaviors depend on method and path together (405 for any other method,
//! a 404 naming the path for everything else). All requests therefore go to
//! a single fallback handler that performs its own dispatch.

use crate::{
    config::Settings,
    handlers::request_handler::{AppState, dispatch},
    services::storage_service::Storage,
};
use axum::{Router, extract::DefaultBodyLimit};

/// Build the router for the publish service.
///
/// The body limit matches the configured maximum payload so that form
/// extraction accepts every body the publish handler admitted.
pub fn routes<S: Storage>(settings: &Settings) -> Router<AppState<S>> {
    let body_limit = usize::try_from(settings.max_payload_size).unwrap_or(usize::MAX);
    Router::new()
        .fallback(dispatch::<S>)
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Router with its state attached, ready to serve.
pub fn build_router<S: Storage>(state: AppState<S>) -> Router {
    routes(&state.settings).with_state(state)
}
