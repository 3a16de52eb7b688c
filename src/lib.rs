//! hackpub: publish JSON or HTML snippets over HTTP and look up their
//! metadata by key.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

pub use handlers::request_handler::AppState;
pub use routes::routes::build_router;
