use super::{
    handlers::{health, root, signup},
    store::Account,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(root::root, health::health, signup::signup),
    components(schemas(
        Account,
        signup::SignupRequest,
        signup::ErrorBody,
        health::Health,
        root::Liveness
    )),
    tags(
        (name = "enlist", description = "Liveness"),
        (name = "health", description = "Dependency health"),
        (name = "signup", description = "Account registration")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    // Use Cargo.toml metadata instead of the utoipa defaults.
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = Some(env!("CARGO_PKG_DESCRIPTION").to_string());
    doc
}
