// Presentation layer - HTTP surface and view projection
pub mod app_state;
pub mod handlers;
pub mod projection;
