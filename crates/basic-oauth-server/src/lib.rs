//! basic-oauth-server: token endpoint for the OAuth v2 resource owner
//! password credentials grant, built on axum.

pub mod config;
pub mod error;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::guard::AuthenticatedUser;
pub use server::{parse_mount, serve, AppState, Endpoint, OAuthRouter};
