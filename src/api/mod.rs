//! HTTP API module for rentq.
//!
//! Router, handlers, and the shared application state behind every endpoint.

mod handlers;
mod rest;

pub use handlers::*;
pub use rest::*;
