//! HTTP surface: health checks, metrics scrape endpoint and server lifecycle.

pub mod handlers;
pub mod module;

pub use handlers::AppState;
pub use module::NetworkModule;
