// Upstream module - v1internal HTTP client

pub mod client;

pub use client::{TransportError, UpstreamClient};
