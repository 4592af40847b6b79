//! Server data types and errors.

pub mod error;

pub use error::*;
