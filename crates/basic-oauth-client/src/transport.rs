//! HTTP transport for token exchanges.
//!
//! Not a browser: a form-urlencoded POST and a page GET are all the
//! interceptor needs.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExchangeResult;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("basic-oauth-client/", env!("CARGO_PKG_VERSION"));

/// Response to a transport request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Raw response text, whatever the status.
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends the token request.
///
/// The interceptor only binds forms when a transport is available.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `fields` form-urlencoded to `url`.
    ///
    /// Non-2xx statuses are not errors; only failing to get a response is.
    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> ExchangeResult<HttpResponse>;
}

/// [`Transport`] backed by reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> ExchangeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// GET a page and return its body, for parsing into a [`crate::Page`].
    pub async fn fetch_page(&self, url: &str) -> ExchangeResult<HttpResponse> {
        let r = self.client.get(url).send().await?;
        into_response(url, r).await
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_form(&self, url: &str, fields: &[(String, String)]) -> ExchangeResult<HttpResponse> {
        let r = self.client.post(url).form(fields).send().await?;
        into_response(url, r).await
    }
}

async fn into_response(url: &str, r: reqwest::Response) -> ExchangeResult<HttpResponse> {
    let status = r.status().as_u16();
    let final_url = r.url().to_string();
    let headers = r
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();
    let body = r.text().await?;

    Ok(HttpResponse {
        url: url.to_string(),
        final_url,
        status,
        headers,
        body,
    })
}
