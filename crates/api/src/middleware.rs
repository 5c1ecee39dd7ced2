use axum::{http::HeaderMap, http::StatusCode, middleware::Next, response::Response};

use trustgate_auth::{Identity, Role, StaffPrincipal};
use trustgate_core::StaffId;
use trustgate_engine::ClientContext;

use crate::app::errors;
use crate::context::{RequestContext, StaffContext};

pub const ACCESS_EMAIL: &str = "x-access-email";
pub const ACCESS_TOKEN: &str = "x-access-token";
pub const STAFF_ID: &str = "x-staff-id";
pub const STAFF_ROLES: &str = "x-staff-roles";
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Attach a [`RequestContext`] to every request. Never rejects: a missing or
/// malformed identity is handled by the operation that needs one.
pub async fn request_context_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let context = RequestContext::new(extract_identity(req.headers()), extract_client(req.headers()));
    req.extensions_mut().insert(context);
    next.run(req).await
}

/// Staff routes sit behind an authenticating proxy that sets the staff
/// headers; their absence is a 401.
pub async fn staff_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let principal = match extract_staff(req.headers()) {
        Ok(p) => p,
        Err(message) => return errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", message),
    };
    req.extensions_mut().insert(StaffContext::new(principal));
    next.run(req).await
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn extract_identity(headers: &HeaderMap) -> Option<Identity> {
    let email = header(headers, ACCESS_EMAIL)?;
    let token = header(headers, ACCESS_TOKEN)?;
    Identity::new(email, token).ok()
}

fn extract_client(headers: &HeaderMap) -> ClientContext {
    // First hop is the original client.
    header(headers, FORWARDED_FOR)
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(ClientContext::from_ip)
        .unwrap_or_default()
}

fn extract_staff(headers: &HeaderMap) -> Result<StaffPrincipal, &'static str> {
    let staff_id: StaffId = header(headers, STAFF_ID)
        .ok_or("missing staff identity")?
        .parse()
        .map_err(|_| "invalid staff id")?;
    let roles = header(headers, STAFF_ROLES)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(|r| Role::new(r.to_string()))
                .collect()
        })
        .unwrap_or_default();
    Ok(StaffPrincipal::new(staff_id, roles))
}
