use axum::response::{IntoResponse, Json};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Debug)]
pub struct Liveness {
    message: String,
}

#[utoipa::path(
    get,
    path = "/",
    responses (
        (status = 200, description = "Service is up", body = Liveness, content_type = "application/json"),
    ),
    tag = "enlist"
)]
// also serves as the fallback for unmatched paths
pub async fn root() -> impl IntoResponse {
    Json(Liveness {
        message: "La la la la".to_string(),
    })
}
