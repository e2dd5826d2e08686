//! API request and response structures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    services::{ArchivedCart, ArchivedLine, CartItem, CartView, ServiceError},
    state::{format_clock, AppState, TimerState, TimerStatus},
};

/// Countdown as shown to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub status: TimerStatus,
    pub remaining_seconds: Option<u64>,
    /// Remaining time as `m:ss`
    pub display: Option<String>,
    pub warning_fired: bool,
    pub duration_seconds: u64,
    pub warning_threshold_seconds: u64,
    pub checkout_open: bool,
}

impl TimerView {
    pub fn from_state(timer: &TimerState, checkout_open: bool) -> Self {
        Self {
            status: timer.status(),
            remaining_seconds: timer.remaining_seconds(),
            display: timer.remaining_seconds().map(format_clock),
            warning_fired: timer.warning_fired(),
            duration_seconds: timer.duration_seconds(),
            warning_threshold_seconds: timer.warning_threshold_seconds(),
            checkout_open,
        }
    }

    pub fn current(state: &AppState) -> Self {
        Self::from_state(&state.get_timer_state(), state.is_checkout_open())
    }
}

/// Response for timer actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub timer: TimerView,
}

impl ApiResponse {
    pub fn new(status: &str, message: impl Into<String>, timer: TimerView) -> Self {
        Self {
            status: status.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
            timer,
        }
    }

    /// The action changed the countdown
    pub fn applied(message: impl Into<String>, timer: TimerView) -> Self {
        Self::new("applied", message, timer)
    }

    /// The action was valid but had no effect in the current state
    pub fn ignored(message: impl Into<String>, timer: TimerView) -> Self {
        Self::new("ignored", message, timer)
    }
}

/// Cart contents together with the countdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartResponse {
    pub cart: CartView,
    pub timer: TimerView,
    pub timestamp: DateTime<Utc>,
}

impl CartResponse {
    pub fn new(cart: CartView, timer: TimerView) -> Self {
        Self {
            cart,
            timer,
            timestamp: Utc::now(),
        }
    }
}

/// Confirmed order lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub items: Vec<ArchivedLine>,
    pub timer: TimerView,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpiredItemsResponse {
    pub carts: Vec<ArchivedCart>,
}

/// Status response with countdown and cart summary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub timer: TimerView,
    pub item_count: usize,
    pub expiry_in_flight: bool,
    pub uptime: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub variant_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub unit_price_cents: u64,
}

impl From<AddItemRequest> for CartItem {
    fn from(request: AddItemRequest) -> Self {
        Self {
            variant_id: request.variant_id,
            quantity: request.quantity,
            unit_price_cents: request.unit_price_cents,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

/// Collaborator failure mapped to an HTTP status
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, remaining) = match &self.0 {
            ServiceError::OutOfStock { remaining, .. } => (StatusCode::CONFLICT, Some(*remaining)),
            ServiceError::ExpiryInProgress => (StatusCode::CONFLICT, None),
            ServiceError::NotInCart(_) => (StatusCode::NOT_FOUND, None),
            ServiceError::InvalidQuantity | ServiceError::EmptyCart => (StatusCode::BAD_REQUEST, None),
            ServiceError::Unavailable { .. } => (StatusCode::BAD_GATEWAY, None),
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            remaining,
        };
        (status, Json(body)).into_response()
    }
}
