//! Configuration loading and resolution.
//!
//! Every setting resolves in the same order: explicit value (CLI flag),
//! then environment variable, then default.

use std::time::Duration;

use basic_oauth::CredentialList;

use crate::error::{ServerError, ServerResult};

pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";

/// Lifetime of an issued token, refreshed on every authorized request.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Longest accepted token TTL: one year.
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 3600;

pub const ENV_ADDR: &str = "BASIC_OAUTH_ADDR";
pub const ENV_TOKEN_TTL: &str = "BASIC_OAUTH_TOKEN_TTL";
pub const ENV_CREDENTIALS: &str = "BASIC_OAUTH_CREDENTIALS";
pub const ENV_INSECURE_COOKIES: &str = "BASIC_OAUTH_INSECURE_COOKIES";
pub const ENV_ALLOW_ORIGIN: &str = "BASIC_OAUTH_ALLOW_ORIGIN";

/// Resolved server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub token_ttl: Duration,
    /// Mark the token cookie `Secure` (sent over https only).
    pub secure_cookies: bool,
    pub allow_origin: Option<String>,
    pub credentials: CredentialList,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
            secure_cookies: true,
            allow_origin: None,
            credentials: CredentialList::new(),
        }
    }
}

/// Resolve the listen address.
pub fn resolve_addr(explicit: Option<&str>) -> String {
    if let Some(addr) = explicit {
        return addr.to_string();
    }
    std::env::var(ENV_ADDR).unwrap_or_else(|_| DEFAULT_ADDR.to_string())
}

/// Resolve the token TTL, in seconds.
pub fn resolve_token_ttl(explicit: Option<u64>) -> ServerResult<Duration> {
    let secs = match explicit {
        Some(secs) => secs,
        None => match std::env::var(ENV_TOKEN_TTL) {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                ServerError::Config(format!("{ENV_TOKEN_TTL} must be a number of seconds, got '{raw}'"))
            })?,
            Err(_) => return Ok(DEFAULT_TOKEN_TTL),
        },
    };
    if secs == 0 {
        return Err(ServerError::Config("token TTL must be at least 1 second".to_string()));
    }
    if secs > MAX_TOKEN_TTL_SECS {
        return Err(ServerError::Config(format!(
            "token TTL must be at most {MAX_TOKEN_TTL_SECS} seconds, got {secs}"
        )));
    }
    Ok(Duration::from_secs(secs))
}

/// Resolve the credential list from `user:pass` entries.
///
/// Explicit entries replace the environment list rather than extend it.
pub fn resolve_credentials(explicit: &[String]) -> ServerResult<CredentialList> {
    let from_env;
    let entries: Vec<&str> = if !explicit.is_empty() {
        explicit.iter().map(String::as_str).collect()
    } else {
        from_env = std::env::var(ENV_CREDENTIALS).unwrap_or_default();
        from_env
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    };

    let mut creds = CredentialList::new();
    for entry in entries {
        let (user, pass) = parse_credential(entry)?;
        creds.add(user, pass);
    }
    Ok(creds)
}

/// Split `user:pass`. The password may itself contain `:`.
pub fn parse_credential(entry: &str) -> ServerResult<(&str, &str)> {
    match entry.split_once(':') {
        Some((user, pass)) if !user.is_empty() && !pass.is_empty() => Ok((user, pass)),
        _ => Err(ServerError::Config(format!(
            "credential '{entry}' must look like user:password"
        ))),
    }
}

/// Whether the token cookie is marked `Secure`.
pub fn resolve_secure_cookies(insecure_flag: bool) -> bool {
    if insecure_flag {
        return false;
    }
    !matches!(
        std::env::var(ENV_INSECURE_COOKIES).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

pub fn resolve_allow_origin(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(String::from)
        .or_else(|| std::env::var(ENV_ALLOW_ORIGIN).ok())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credential() {
        assert_eq!(parse_credential("johndoe:foobar42").unwrap(), ("johndoe", "foobar42"));
        assert_eq!(parse_credential("a:b:c").unwrap(), ("a", "b:c"));
        assert!(parse_credential("nopassword").is_err());
        assert!(parse_credential(":pass").is_err());
        assert!(parse_credential("user:").is_err());
    }

    #[test]
    fn test_explicit_values_win() {
        assert_eq!(resolve_addr(Some("0.0.0.0:8080")), "0.0.0.0:8080");
        assert_eq!(resolve_token_ttl(Some(60)).unwrap(), Duration::from_secs(60));
        assert!(!resolve_secure_cookies(true));
        assert_eq!(
            resolve_allow_origin(Some("https://app.example.com")).as_deref(),
            Some("https://app.example.com")
        );
    }

    #[test]
    fn test_zero_ttl_rejected() {
        assert!(matches!(resolve_token_ttl(Some(0)), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_ttl_upper_bound() {
        assert_eq!(
            resolve_token_ttl(Some(MAX_TOKEN_TTL_SECS)).unwrap(),
            Duration::from_secs(MAX_TOKEN_TTL_SECS)
        );
        assert!(matches!(
            resolve_token_ttl(Some(MAX_TOKEN_TTL_SECS + 1)),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(resolve_token_ttl(Some(u64::MAX)), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_explicit_credentials() {
        let creds =
            resolve_credentials(&["johndoe:foobar42".to_string(), "alice:secret".to_string()])
                .unwrap();
        assert_eq!(creds.len(), 2);
        assert!(resolve_credentials(&["broken".to_string()]).is_err());
    }
}
