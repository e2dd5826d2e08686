//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::{info, warn};

use super::responses::{
    AddItemRequest, ApiError, ApiResponse, CartResponse, ExpiredItemsResponse, HealthResponse,
    OrderResponse, StatusResponse, TimerView, UpdateQuantityRequest,
};
use crate::{
    policy::TimerAction,
    state::{format_clock, AppState},
};

/// Handle GET /timer - Return the countdown and cart summary
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let item_count = match state.cart_view().await {
        Ok(cart) => cart.items.len(),
        Err(e) => {
            warn!("Failed to read cart for status: {}", e);
            0
        }
    };

    Json(StatusResponse {
        timer: TimerView::current(&state),
        item_count,
        expiry_in_flight: state.is_expiry_in_flight(),
        uptime: state.get_uptime(),
    })
}

/// Handle POST /timer/extend - Reset the countdown to its full duration
pub async fn extend_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    if state.request_extend().await {
        info!("Extend endpoint called - cart timer reset");
        let message = format!(
            "Cart timer reset to {}",
            format_clock(state.settings.duration_seconds)
        );
        Json(ApiResponse::applied(message, TimerView::current(&state)))
    } else {
        Json(ApiResponse::ignored(
            "No active cart timer to extend",
            TimerView::current(&state),
        ))
    }
}

/// Handle GET /cart
pub async fn cart_handler(State(state): State<Arc<AppState>>) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.cart_view().await?;
    Ok(Json(CartResponse::new(cart, TimerView::current(&state))))
}

/// Handle POST /cart/items - Reserve stock and add an item
pub async fn add_item_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    info!("Adding {} x {} to cart", request.quantity, request.variant_id);
    let cart = state.add_item(request.into()).await?;
    Ok(Json(CartResponse::new(cart, TimerView::current(&state))))
}

/// Handle PATCH /cart/items/:variant_id - Change a line's quantity
pub async fn update_item_handler(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.update_quantity(&variant_id, request.quantity).await?;
    Ok(Json(CartResponse::new(cart, TimerView::current(&state))))
}

/// Handle DELETE /cart/items/:variant_id
pub async fn remove_item_handler(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.remove_item(&variant_id).await?;
    Ok(Json(CartResponse::new(cart, TimerView::current(&state))))
}

/// Handle DELETE /cart - Empty the cart and stop the countdown
pub async fn clear_cart_handler(State(state): State<Arc<AppState>>) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.clear_cart().await?;
    Ok(Json(CartResponse::new(cart, TimerView::current(&state))))
}

/// Handle POST /checkout/open - Pause the countdown and extend stock holds
pub async fn checkout_open_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    match state.open_checkout().await {
        TimerAction::Pause => Json(ApiResponse::applied(
            "Checkout opened, cart timer paused",
            TimerView::current(&state),
        )),
        _ => Json(ApiResponse::ignored(
            "Cart timer not paused",
            TimerView::current(&state),
        )),
    }
}

/// Handle POST /checkout/cancel - Resume the countdown
pub async fn checkout_cancel_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    match state.cancel_checkout().await {
        TimerAction::Resume => Json(ApiResponse::applied(
            "Checkout cancelled, cart timer resumed",
            TimerView::current(&state),
        )),
        _ => Json(ApiResponse::ignored(
            "Cart timer was not paused",
            TimerView::current(&state),
        )),
    }
}

/// Handle POST /checkout/complete - Confirm the order
pub async fn checkout_complete_handler(State(state): State<Arc<AppState>>) -> Result<Json<OrderResponse>, ApiError> {
    let items = state.complete_order().await?;
    Ok(Json(OrderResponse {
        items,
        timer: TimerView::current(&state),
        timestamp: chrono::Utc::now(),
    }))
}

/// Handle GET /expired-items - Carts archived on expiry, for reorder
pub async fn expired_items_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExpiredItemsResponse>, ApiError> {
    let carts = state.collaborators().archive.list().await?;
    Ok(Json(ExpiredItemsResponse { carts }))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
