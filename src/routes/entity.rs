//! Model CRUD and form spec routes.
//! Static segments (`bulk`, `formspec`) take priority over the `:label` parameter,
//! so those labels are reserved at registry build time.

use crate::handlers::entity::{bulk, create, delete, list, read, update};
use crate::handlers::formspec::{choices, choices_many, create_spec, update_spec};
use crate::settings::DEFAULT_BODY_LIMIT;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

/// CRUD routes with the default request body limit. Nest under the registry's prefix.
pub fn crud_routes(state: AppState) -> Router {
    crud_routes_with_limit(state, DEFAULT_BODY_LIMIT)
}

pub fn crud_routes_with_limit(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/bulk/:action", post(bulk))
        .route("/formspec/:label", get(create_spec))
        .route("/formspec/:label/update/:lookup", get(update_spec))
        .route("/formspec/:label/choices/:column", get(choices))
        .route("/formspec/:label/choices-many/:edge", get(choices_many))
        .route("/:label", get(list).post(create))
        .route(
            "/:label/:lookup",
            get(read).post(update).patch(update).put(update).delete(delete),
        )
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
