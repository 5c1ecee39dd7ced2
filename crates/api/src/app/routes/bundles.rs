use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use trustgate_core::{BundleId, CodeId};
use trustgate_engine::CodeSpec;

use crate::app::{dto, errors, AppServices};
use crate::context::{RequestContext, StaffContext};

pub fn admin_router() -> Router {
    Router::new()
        .route("/", post(create_bundle).get(list_bundles))
        .route("/:id/codes", post(create_code).get(list_codes))
}

pub async fn create_bundle(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Json(body): Json<dto::BundleBody>,
) -> axum::response::Response {
    match services
        .engine
        .create_bundle(&body.name, body.items, staff.principal())
        .await
    {
        Ok(bundle) => (StatusCode::CREATED, Json(bundle)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn list_bundles(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
) -> axum::response::Response {
    match services.engine.list_bundles(staff.principal()).await {
        Ok(bundles) => Json(bundles).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn create_code(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
    body: Option<Json<CodeSpec>>,
) -> axum::response::Response {
    let bundle_id: BundleId = match errors::parse_id(&id, "bundle") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let spec = body.map(|Json(s)| s).unwrap_or_default();
    match services.engine.create_code(bundle_id, spec, staff.principal()).await {
        Ok(code) => (StatusCode::CREATED, Json(code)).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn list_codes(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let bundle_id: BundleId = match errors::parse_id(&id, "bundle") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.list_codes(bundle_id, staff.principal()).await {
        Ok(codes) => Json(codes).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn delete_code(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let code_id: CodeId = match errors::parse_id(&id, "code") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.delete_code(code_id, staff.principal()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn list_redemptions(
    Extension(services): Extension<AppServices>,
    Extension(staff): Extension<StaffContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let code_id: CodeId = match errors::parse_id(&id, "code") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.engine.list_redemptions(code_id, staff.principal()).await {
        Ok(redemptions) => Json(redemptions).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn redeem(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<dto::RedeemBody>,
) -> axum::response::Response {
    match services.engine.redeem_code(&body.code, &body.email, ctx.client()).await {
        Ok(redeemed) => Json(redeemed).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}
