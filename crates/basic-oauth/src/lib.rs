//! basic-oauth: core of the OAuth v2 "Resource Owner Password Credentials
//! Grant": request and response shapes, token issuing, and the pluggable
//! authenticator and session store used by the token endpoint.

pub mod authenticator;
pub mod store;
pub mod token;
pub mod types;

pub use authenticator::{Authenticator, CredentialList};
pub use store::{MemoryTokenStore, Session, TokenStore};
pub use token::{client_ip, generate_access_token, sign_token};
pub use types::*;
