//! Route definitions for the person server.

use axum::{
    Router,
    routing::{get, post}
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer
};

use crate::handlers;
use crate::state::AppState;

/// Creates the Axum router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/person",
            post(handlers::create_person).get(handlers::list_persons)
        )
        .route("/person/search/findByEmail", get(handlers::find_by_email))
        .route(
            "/person/{id}",
            get(handlers::get_person)
                .put(handlers::replace_person)
                .patch(handlers::patch_person)
                .delete(handlers::delete_person)
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
