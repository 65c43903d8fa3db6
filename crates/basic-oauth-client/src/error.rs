//! Errors raised by a token exchange.

/// Ways a token exchange can fail to produce a JSON response.
#[derive(thiserror::Error, Debug)]
pub enum ExchangeError {
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not JSON. Raised regardless of status code.
    #[error("Malformed response (HTTP {status}): {source}")]
    MalformedResponse {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("Exchange task aborted: {0}")]
    Aborted(String),
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
