//! Authorizing requests with an issued token.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRef, FromRequestParts, Query};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::Response;
use basic_oauth::{client_ip, sign_token, GrantErrorCode, UserId};
use tracing::{debug, warn};

use super::response::{error_response, presented_token, server_error, TokenQuery};
use super::AppState;

/// Address and user agent a token is bound to.
pub(crate) fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> (String, String) {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());
    let peer = peer.map(|p| p.ip().to_string()).unwrap_or_default();
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    (client_ip(forwarded, &peer), user_agent)
}

/// Extractor for handlers that require a valid access token.
///
/// The token is taken from the `access_token` query parameter or cookie.
/// It must be live and presented by the same client address and user
/// agent it was issued to; a token presented by anyone else is revoked.
/// Each successful check slides the token's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);

        let query = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();
        let Some(token) = presented_token(&query, &parts.headers) else {
            return Err(error_response(GrantErrorCode::InvalidRequest));
        };

        let session = match state.store.get(&token).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("unknown or expired access token");
                return Err(error_response(GrantErrorCode::InvalidGrant));
            }
            Err(e) => return Err(server_error(e)),
        };

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let (remote_addr, user_agent) = client_identity(&parts.headers, peer);

        if sign_token(&token, &remote_addr, &user_agent) != session.signature {
            warn!(
                user_id = session.user_id,
                %remote_addr,
                "access token presented by a different client, revoking it"
            );
            if let Err(e) = state.store.remove(&token).await {
                return Err(server_error(e));
            }
            return Err(error_response(GrantErrorCode::InvalidGrant));
        }

        if let Err(e) = state.store.touch(&token, state.token_ttl).await {
            return Err(server_error(e));
        }

        Ok(AuthenticatedUser {
            user_id: session.user_id,
        })
    }
}
