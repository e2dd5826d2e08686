//! External service module
//!
//! This module contains the collaborator contracts the cart timer talks to,
//! their in-memory implementations and the expiration sequence.

pub mod collaborators;
pub mod expiry;
pub mod memory;

// Re-export main types
pub use collaborators::*;
pub use expiry::{ExpirationHandler, ExpiryReport};
pub use memory::{InMemoryArchive, InMemoryCart, InMemoryStock, LogNotifier};
