//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: component wiring (store, catalog, limiter, notifier)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs
//! - `errors.rs`: consistent error responses

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{build_services, AppServices};

/// Build the full HTTP router around already-wired services.
pub fn build_app(services: AppServices) -> Router {
    let staff = routes::admin_router().layer(axum::middleware::from_fn(middleware::staff_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::public_router())
        .nest("/admin", staff)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_context_middleware))
                .layer(Extension(services)),
        )
}
