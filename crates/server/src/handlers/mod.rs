//! HTTP request handlers.

pub mod artifacts;
pub mod auth;
pub mod health;
pub mod uploads;

pub use artifacts::*;
pub use auth::*;
pub use health::*;
pub use uploads::*;
