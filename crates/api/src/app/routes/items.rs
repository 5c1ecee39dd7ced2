use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    Json,
};

use trustgate_core::{DomainError, ItemRef};
use trustgate_engine::AccessError;

use crate::app::{errors, AppServices};
use crate::context::RequestContext;

pub(crate) fn item_ref(kind: &str, id: &str) -> Result<ItemRef, axum::response::Response> {
    format!("{kind}:{id}")
        .parse()
        .map_err(|e: DomainError| errors::access_error_to_response(e.into()))
}

/// Missing portal headers verify as invalid rather than failing.
pub async fn verify_token(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
) -> axum::response::Response {
    let Some(identity) = ctx.identity() else {
        return Json(trustgate_auth::TokenVerification::invalid()).into_response();
    };
    match services.engine.verify_token(identity).await {
        Ok(verification) => Json(verification).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn accessible_items(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
) -> axum::response::Response {
    let Some(identity) = ctx.identity() else {
        return errors::access_error_to_response(DomainError::Unauthorized.into());
    };
    match services.engine.accessible_items(identity).await {
        Ok(items) => Json(items).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

pub async fn has_access(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
) -> axum::response::Response {
    let item = match item_ref(&kind, &id) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let result = match ctx.identity() {
        Some(identity) => services.engine.has_access(identity, item).await,
        // Anonymous callers see public items only.
        None => match services.engine.authorize_item(None, item).await {
            Ok(_) => Ok(true),
            Err(AccessError::Domain(DomainError::Unauthorized)) => Ok(false),
            Err(e) => Err(e),
        },
    };
    match result {
        Ok(allowed) => Json(serde_json::json!({ "item": item, "has_access": allowed })).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}

/// Gate for file delivery; the file itself is served elsewhere.
pub async fn download(
    Extension(services): Extension<AppServices>,
    Extension(ctx): Extension<RequestContext>,
    Path((kind, id)): Path<(String, String)>,
) -> axum::response::Response {
    let item = match item_ref(&kind, &id) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    match services.engine.authorize_item(ctx.identity(), item).await {
        Ok(entry) => Json(entry).into_response(),
        Err(e) => errors::access_error_to_response(e),
    }
}
