//! JSON responses and token cookies.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE, PRAGMA, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use basic_oauth::{ErrorResponse, GrantErrorCode, ACCESS_TOKEN_PARAM};
use serde::{Deserialize, Serialize};

const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Serialize `body` as pretty JSON with the no-cache headers every token
/// endpoint response carries.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let json = match serde_json::to_string_pretty(body) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("failed to serialize response: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    (
        status,
        [
            (CONTENT_TYPE, JSON_CONTENT_TYPE),
            (CACHE_CONTROL, "no-store"),
            (PRAGMA, "no-cache"),
        ],
        json,
    )
        .into_response()
}

/// `400 Bad Request` carrying an OAuth error code.
pub fn error_response(body: impl Into<ErrorResponse>) -> Response {
    json_response(StatusCode::BAD_REQUEST, &body.into())
}

/// `500` for failures of the authenticator or token store.
pub fn server_error(err: impl std::fmt::Display) -> Response {
    tracing::error!("token endpoint failure: {err}");
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &ErrorResponse::new(GrantErrorCode::ServerError),
    )
}

/// `Set-Cookie` value carrying an issued token.
pub fn token_cookie(token: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!("{ACCESS_TOKEN_PARAM}={token}; Max-Age={max_age_secs}; Path=/");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn set_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!("dropping unrepresentable cookie: {e}"),
    }
}

/// First cookie named `name` across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// Query parameters that may carry the access token.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub access_token: Option<String>,
}

/// The token a request presents: query parameter first, then cookie.
pub fn presented_token(query: &TokenQuery, headers: &HeaderMap) -> Option<String> {
    query
        .access_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| cookie_value(headers, ACCESS_TOKEN_PARAM).filter(|t| !t.is_empty()))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response_headers() {
        let resp = json_response(StatusCode::OK, &serde_json::json!({}));
        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers();
        assert_eq!(headers[CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert_eq!(headers[CACHE_CONTROL], "no-store");
        assert_eq!(headers[PRAGMA], "no-cache");
    }

    #[test]
    fn test_error_response_is_bad_request() {
        let resp = error_response(GrantErrorCode::InvalidGrant);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_token_cookie() {
        assert_eq!(
            token_cookie("abc", 3600, true),
            "access_token=abc; Max-Age=3600; Path=/; Secure"
        );
        assert_eq!(
            token_cookie("abc", 60, false),
            "access_token=abc; Max-Age=60; Path=/"
        );
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; access_token=tok=="));
        assert_eq!(cookie_value(&headers, "access_token"), Some("tok=="));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_presented_token_prefers_query() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("access_token=from-cookie"));

        let query = TokenQuery {
            access_token: Some("from-query".to_string()),
        };
        assert_eq!(presented_token(&query, &headers).as_deref(), Some("from-query"));

        let empty = TokenQuery::default();
        assert_eq!(presented_token(&empty, &headers).as_deref(), Some("from-cookie"));
        assert_eq!(presented_token(&empty, &HeaderMap::new()), None);
    }
}
