//! Map session management.

pub mod choropleth;
pub mod manager;

pub use manager::SignpostSession;
