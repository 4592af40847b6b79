//! Signpost server: fetches map data, owns the map state, and serves the map client API.

pub mod config;
pub mod fetch;
pub mod geocode;
pub mod loading;
pub mod queries;
pub mod session;
pub mod transport;
pub mod types;

pub use config::SignpostConfig;
pub use fetch::Fetcher;
pub use loading::{LoadingGuard, LoadingIndicator};
pub use session::SignpostSession;
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use types::{ServerError, ServerResult};
