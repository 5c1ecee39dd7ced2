use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use trustgate_access::PortalGrants;
use trustgate_core::RequestId;

use crate::app::{dto, errors, AppServices};
use crate::context::{RequestContext, StaffContext};

pub fn admin_router() -> Router {
    Router::new()
        .route("/requests", get(list_requests))
        .route("/requests/:id/approve", post(approve_request))
        .route("/requests/:id/grants", put(update_grants))
        .route("/requests/:id/reject", post(reject_request))
        .route("/requests/:id/revoke", post(revoke_request))
}

pub async fn submit_request(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::SimpleRequestBody>,
) -> axum::response::Response {
    match services
        .engine
        .submit_simple_request(&body.email, body.name, body.company, ctx.client())
        .await
    {
        Ok(out) => {
            let status = if out.created { StatusCode::CREATED } else { StatusCode::OK };
            (status, Json(out)).into_response()
        }
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn list_requests(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Query(query): Query<dto::StatusQuery>,
) -> axum::response::Response {
    let status = match query.parse() {
        Ok(s) => s,
        Err(e) => return errors::access_error_to_response(e.into()),
    };
    match services.engine.list_simple_requests(status, staff.principal()).await {
        Ok(requests) => Json(requests).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn approve_request(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::GrantsBody>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .engine
        .approve_simple(id, PortalGrants::from(body), staff.principal())
        .await
    {
        // The token itself only travels in the approval notification.
        Ok(approval) => Json(serde_json::json!({
            "request": approval.request,
            "token_expires_at": approval.token.expires_at,
            "notified": approval.notified,
        }))
        .into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn update_grants(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::GrantsBody>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .engine
        .update_simple_grants(id, PortalGrants::from(body), staff.principal())
        .await
    {
        Ok(request) => Json(request).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn reject_request(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.reject_simple(id, staff.principal()).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn revoke_request(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.revoke_simple(id, staff.principal()).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}
