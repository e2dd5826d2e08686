//! Cart Timer - reservation countdown for a sneaker storefront cart
//!
//! This library keeps a per-cart countdown consistent across restarts and
//! checkout pauses, coordinates stock holds, and archives then clears the
//! cart exactly once when the countdown runs out.

pub mod api;
pub mod config;
pub mod policy;
pub mod services;
pub mod state;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use config::Config;
pub use policy::{CartEvent, TimerAction};
pub use state::{AppState, TimerSettings, TimerState, TimerStatus};
pub use utils::signals::shutdown_signal;
