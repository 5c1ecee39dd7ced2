use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use trustgate_core::DomainError;
use trustgate_engine::AccessError;

pub fn access_error_to_response(err: AccessError) -> axum::response::Response {
    let status = match &err {
        AccessError::Domain(DomainError::Validation(_)) => StatusCode::BAD_REQUEST,
        AccessError::Domain(DomainError::Unauthorized) => StatusCode::UNAUTHORIZED,
        AccessError::Domain(DomainError::Forbidden(_)) => StatusCode::FORBIDDEN,
        AccessError::Domain(DomainError::NotFound(_)) => StatusCode::NOT_FOUND,
        AccessError::Domain(DomainError::Conflict(_)) => StatusCode::CONFLICT,
        AccessError::Domain(DomainError::Expired(_)) => StatusCode::GONE,
        AccessError::Domain(DomainError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
        AccessError::Store(e) => {
            tracing::error!(error = %e, "store failure");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "store", "internal error");
        }
    };
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment into a typed id, answering 400 on failure.
pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr,
{
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}
