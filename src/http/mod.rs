//! HTTP and WebSocket transports.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, method → accepted operations)
//!     → request.rs (request ID for the call span)
//!     → Gateway::handle
//!     → response.rs (status code + envelope)
//!
//! Upgrade on /mongodb/ws
//!     → sessions.rs (slot reservation)
//!     → websocket.rs (event loop, one Gateway::handle per `mongodb` event)
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod sessions;
pub mod websocket;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
