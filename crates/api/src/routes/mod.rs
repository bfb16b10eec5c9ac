//! HTTP and WebSocket routes

pub mod alerts;
pub mod detect;
pub mod health;
pub mod live;
pub mod sessions;
pub mod stream;
