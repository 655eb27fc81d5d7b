// galileo-api: Async Rust client plumbing for the Galileo backend (REST + push channel)

pub mod auth;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod models;
pub mod push;
pub mod transport;

pub use auth::{Credential, TokenStore};
pub use client::{Query, RequestExecutor};
pub use endpoint::{API_PREFIX, ApiBase};
pub use error::Error;
pub use push::{
    PushSignal, PushSource, PushStream, ReconnectConfig, WebSocketPushSource, backoff_delay,
};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, RequestBody, TlsMode, Transport, TransportConfig,
};

// Re-exported so downstream crates can name methods and status codes
// without depending on reqwest directly.
pub use reqwest::{Method, StatusCode};
