//! Request handlers.

pub mod detect;
pub mod health;
pub mod upload;
pub mod video;

pub use health::*;
