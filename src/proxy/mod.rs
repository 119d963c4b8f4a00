// Proxy service module

pub mod common;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod mappers;
pub mod middleware;
pub mod server;
pub mod upstream;

pub use config::{resolve_thinking, ThinkingSettings};
pub use credentials::{Credential, CredentialGateway, CredentialPool};
pub use error::ProxyError;
pub use server::{build_router, GatewayServer};
