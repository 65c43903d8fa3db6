//! Wire types shared by the token endpoint and the form interceptor.

use serde::{Deserialize, Serialize};

/// The only grant type this crate understands.
pub const PASSWORD_GRANT_TYPE: &str = "password";

/// Token type reported in every successful grant.
pub const BEARER_TOKEN_TYPE: &str = "bearer";

/// Name of the cookie and query parameter carrying the access token.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Opaque user identifier returned by an [`crate::Authenticator`].
pub type UserId = u64;

/// Username and password submitted by a resource owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordGrant {
    pub username: String,
    pub password: String,
}

impl PasswordGrant {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Form fields of the token request, in wire order.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        vec![
            ("grant_type".to_string(), PASSWORD_GRANT_TYPE.to_string()),
            ("username".to_string(), self.username.clone()),
            ("password".to_string(), self.password.clone()),
        ]
    }
}

/// A token request as received by the login endpoint.
///
/// Every field is optional so that a partially filled form still
/// deserializes and can be answered with `invalid_request`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GrantRequest {
    pub grant_type: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl GrantRequest {
    /// Check the request shape and extract the credentials.
    ///
    /// Empty values count as missing.
    pub fn validate(self) -> Result<PasswordGrant, GrantErrorCode> {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());

        let (Some(grant_type), Some(username), Some(password)) = (
            present(self.grant_type),
            present(self.username),
            present(self.password),
        ) else {
            return Err(GrantErrorCode::InvalidRequest);
        };

        if grant_type != PASSWORD_GRANT_TYPE {
            return Err(GrantErrorCode::UnsupportedGrantType);
        }

        Ok(PasswordGrant { username, password })
    }
}

/// Error codes from section 5.2 of the OAuth v2 draft that this grant emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantErrorCode {
    InvalidRequest,
    UnsupportedGrantType,
    InvalidGrant,
    ServerError,
}

impl GrantErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantErrorCode::InvalidRequest => "invalid_request",
            GrantErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            GrantErrorCode::InvalidGrant => "invalid_grant",
            GrantErrorCode::ServerError => "server_error",
        }
    }
}

impl std::fmt::Display for GrantErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: GrantErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: GrantErrorCode) -> Self {
        Self {
            error,
            error_description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }
}

impl From<GrantErrorCode> for ErrorResponse {
    fn from(code: GrantErrorCode) -> Self {
        Self::new(code)
    }
}

/// Successful token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl TokenResponse {
    pub fn bearer(access_token: impl Into<String>, expires_in: u64) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: BEARER_TOKEN_TYPE.to_string(),
            expires_in,
        }
    }
}

/// Errors raised by the core library.
#[derive(thiserror::Error, Debug)]
pub enum OAuthError {
    /// A [`crate::TokenStore`] could not read or write a session.
    #[error("Token store error: {0}")]
    Store(String),

    /// An [`crate::Authenticator`] backend failed, as opposed to rejecting
    /// the credentials.
    #[error("Authenticator error: {0}")]
    Authenticator(String),
}

/// Convenience result type.
pub type OAuthResult<T> = Result<T, OAuthError>;
