//! HTTP API module
//!
//! This module contains all HTTP endpoint handlers and response structures.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/timer", get(status_handler))
        .route("/timer/extend", post(extend_handler))
        .route("/cart", get(cart_handler).delete(clear_cart_handler))
        .route("/cart/items", post(add_item_handler))
        .route(
            "/cart/items/:variant_id",
            patch(update_item_handler).delete(remove_item_handler),
        )
        .route("/checkout/open", post(checkout_open_handler))
        .route("/checkout/cancel", post(checkout_cancel_handler))
        .route("/checkout/complete", post(checkout_complete_handler))
        .route("/expired-items", get(expired_items_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
