use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::StaffContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(staff): Extension<StaffContext>) -> impl IntoResponse {
    let principal = staff.principal();
    Json(serde_json::json!({
        "staff_id": principal.staff_id.to_string(),
        "roles": principal.roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": principal.permissions().iter().map(|p| p.as_str().to_string()).collect::<Vec<_>>(),
    }))
}
