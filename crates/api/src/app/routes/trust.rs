use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use trustgate_core::GatedRequestId;
use trustgate_engine::{GatedApprovalOptions, GatedRejectionOptions, GatedSubmissionRequest};

use crate::app::{dto, errors, AppServices};
use crate::context::{RequestContext, StaffContext};

pub fn admin_router() -> Router {
    Router::new()
        .route("/requests", get(list_requests))
        .route("/requests/bulk-approve", post(bulk_approve))
        .route("/requests/bulk-reject", post(bulk_reject))
        .route("/requests/:id/approve", post(approve_request))
        .route("/requests/:id/reject", post(reject_request))
        .route("/requests/:id/resend", post(resend_link))
}

pub async fn submit_request(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<GatedSubmissionRequest>,
) -> axum::response::Response {
    match services.engine.submit_gated_request(body, ctx.client()).await {
        Ok(out) => (StatusCode::CREATED, Json(out)).into_response(),
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
    match services.engine.list_gated_requests(status, staff.principal()).await {
        Ok(requests) => Json(requests).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

/// Body is optional; defaults are "never expires" and "send the email".
pub async fn approve_request(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
    body: Option<Json<GatedApprovalOptions>>,
) -> axum::response::Response {
    let id: GatedRequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let options = body.map(|Json(o)| o).unwrap_or_default();
    match services.engine.approve_gated(id, options, staff.principal()).await {
        Ok(approval) => Json(serde_json::json!({
            "request": approval.request,
            "grants": approval.grants,
            "token_expires_at": approval.token.expires_at,
            "notified": approval.notified,
        }))
        .into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn reject_request(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
    body: Option<Json<GatedRejectionOptions>>,
) -> axum::response::Response {
    let id: GatedRequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let options = body.map(|Json(o)| o).unwrap_or_default();
    match services.engine.reject_gated(id, options, staff.principal()).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn bulk_approve(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Json(body): Json<dto::BulkApproveBody>,
) -> axum::response::Response {
    let options = GatedApprovalOptions {
        grant_expiry_days: body.grant_expiry_days,
        send_email: body.send_email,
    };
    match services
        .engine
        .bulk_approve_gated(&body.ids, options, staff.principal())
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn bulk_reject(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Json(body): Json<dto::BulkRejectBody>,
) -> axum::response::Response {
    match services
        .engine
        .bulk_reject_gated(&body.ids, body.reason, staff.principal())
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn resend_link(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: GatedRequestId = match errors::parse_id(&id, "request") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.resend_gated_link(id, staff.principal()).await {
        Ok(resend) => Json(serde_json::json!({
            "request_id": resend.request_id,
            "token_expires_at": resend.token.expires_at,
            "superseded": resend.superseded,
            "notified": resend.notified,
        }))
        .into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}
