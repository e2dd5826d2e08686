//! Activity and extension rules for the cart countdown
//!
//! Maps what the shopper did to what the countdown should do. Side effects
//! on stock holds are applied by `AppState`; this module only decides.

use serde::{Deserialize, Serialize};

use crate::state::TimerStatus;

/// Shopper or order activity that may affect the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CartEvent {
    ItemAdded,
    CheckoutOpened,
    CheckoutCancelled,
    OrderCompleted,
    /// Last item removed or the cart was cleared outside the timer
    CartEmptied,
    /// Shopper asked for more time from the warning prompt
    ExtendRequested,
}

/// Transition the countdown should take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerAction {
    Start,
    Extend,
    Pause,
    Resume,
    Stop,
    Ignore,
}

/// Engine facts the rules depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyContext {
    pub status: TimerStatus,
    pub checkout_open: bool,
    pub expiry_in_flight: bool,
}

/// Decide the countdown transition for one event
pub fn decide(event: CartEvent, ctx: PolicyContext) -> TimerAction {
    use TimerStatus::*;

    match event {
        CartEvent::ItemAdded if ctx.expiry_in_flight => TimerAction::Ignore,
        CartEvent::ItemAdded => match ctx.status {
            Idle | Expired => TimerAction::Start,
            Active => TimerAction::Extend,
            // Checkout in progress, leave the frozen countdown alone.
            Paused => TimerAction::Ignore,
        },
        CartEvent::CheckoutOpened if ctx.status == Active && !ctx.checkout_open => TimerAction::Pause,
        CartEvent::CheckoutOpened => TimerAction::Ignore,
        CartEvent::CheckoutCancelled if ctx.status == Paused => TimerAction::Resume,
        CartEvent::CheckoutCancelled => TimerAction::Ignore,
        CartEvent::OrderCompleted | CartEvent::CartEmptied => TimerAction::Stop,
        CartEvent::ExtendRequested if ctx.status == Active => TimerAction::Extend,
        CartEvent::ExtendRequested => TimerAction::Ignore,
    }
}
