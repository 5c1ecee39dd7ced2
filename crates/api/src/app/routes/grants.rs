use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::app::{dto, errors, AppServices};
use crate::context::StaffContext;

pub async fn grant_direct(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Json(body): Json<dto::DirectGrantBody>,
) -> axum::response::Response {
    match services
        .engine
        .grant_direct(&body.email, body.items, body.expiry_days, staff.principal())
        .await
    {
        Ok(grants) => (StatusCode::CREATED, Json(grants)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn list_grants(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Query(query): Query<dto::EmailQuery>,
) -> axum::response::Response {
    match services.engine.list_grants(&query.email, staff.principal()).await {
        Ok(grants) => Json(grants).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn revoke_grant(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path((kind, id)): Path<(String, String)>,
    Query(query): Query<dto::EmailQuery>,
) -> axum::response::Response {
    let item = match super::items::item_ref(&kind, &id) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    match services.engine.revoke_grant(&query.email, item, staff.principal()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}
