//! MongoDB gateway library.
//!
//! Translates JSON operation descriptors into document database calls over
//! HTTP and WebSocket. Every call brings its own connection URI; the broker
//! opens, probes and releases a dedicated connection for it.

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod store;

pub use config::GatewayConfig;
pub use error::{ErrorKind, GatewayError};
pub use gateway::{Gateway, GatewayRequest};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
