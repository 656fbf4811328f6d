use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Liveness endpoint.
pub mod health;
/// Caller identity extractor.
pub mod identity;
/// Verdict lookup and retry.
pub mod judgment;
/// Messages and polling.
pub mod messages;
/// Room creation, joining and exit.
pub mod rooms;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(rooms::router())
        .merge(messages::router())
        .merge(judgment::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
