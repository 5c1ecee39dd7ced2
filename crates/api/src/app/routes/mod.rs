use axum::{
    routing::{delete, get, post},
    Router,
};

pub mod bundles;
pub mod grants;
pub mod items;
pub mod portal;
pub mod system;
pub mod trust;

/// Unauthenticated and portal-identity endpoints.
pub fn public_router() -> Router {
    Router::new()
        .route("/portal/requests", post(portal::submit_request))
        .route("/trust/requests", post(trust::submit_request))
        .route("/tokens/verify", post(items::verify_token))
        .route("/items", get(items::accessible_items))
        .route("/items/:kind/:id/access", get(items::has_access))
        .route("/items/:kind/:id/download", get(items::download))
        .route("/redeem", post(bundles::redeem))
}

/// Staff endpoints, mounted under `/admin` behind the staff middleware.
pub fn admin_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/portal", portal::admin_router())
        .nest("/trust", trust::admin_router())
        .route("/grants", post(grants::grant_direct).get(grants::list_grants))
        .route("/grants/:kind/:id", delete(grants::revoke_grant))
        .nest("/bundles", bundles::admin_router())
        .route("/codes/:id", delete(bundles::delete_code))
        .route("/codes/:id/redemptions", get(bundles::list_redemptions))
}
