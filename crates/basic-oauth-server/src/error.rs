//! Errors raised while configuring or running the server.

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No such endpoint: {0} (expected login, logout or page)")]
    UnknownEndpoint(String),

    #[error("OAuth error: {0}")]
    OAuth(#[from] basic_oauth::OAuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
