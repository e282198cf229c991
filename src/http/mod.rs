//! HTTP API server for reciting clients
//!
//! This module provides:
//! - GET /ws - WebSocket endpoint, one reciting session per connection
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
