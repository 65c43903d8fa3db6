//! Login and logout endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Form;
use basic_oauth::{
    generate_access_token, sign_token, GrantErrorCode, GrantRequest, Session, TokenResponse,
};
use tracing::{debug, info};

use super::guard::client_identity;
use super::response::{
    error_response, json_response, presented_token, server_error, set_cookie, token_cookie,
    TokenQuery,
};
use super::AppState;

/// `POST` a password grant, get a bearer token.
///
/// Credentials arrive in clear text, form-urlencoded. On success the token
/// is returned in the JSON body and set as the `access_token` cookie.
pub async fn login(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    form: Option<Form<GrantRequest>>,
) -> Response {
    let Some(Form(request)) = form else {
        return error_response(GrantErrorCode::InvalidRequest);
    };
    let grant = match request.validate() {
        Ok(grant) => grant,
        Err(code) => {
            debug!(error = %code, "rejected token request");
            return error_response(code);
        }
    };

    let user_id = match state
        .authenticator
        .authenticate(&grant.username, &grant.password)
        .await
    {
        Ok(Some(user_id)) => user_id,
        Ok(None) => {
            debug!(username = %grant.username, "invalid credentials");
            return error_response(GrantErrorCode::InvalidGrant);
        }
        Err(e) => return server_error(e),
    };

    let token = generate_access_token();
    let (remote_addr, user_agent) = client_identity(&headers, peer.map(|ConnectInfo(addr)| addr));
    let session = Session {
        signature: sign_token(&token, &remote_addr, &user_agent),
        user_id,
        remote_addr,
        user_agent,
    };
    if let Err(e) = state.store.insert(&token, session, state.token_ttl).await {
        return server_error(e);
    }

    info!(user_id, "issued access token");

    let ttl = state.token_ttl.as_secs();
    let mut response = json_response(StatusCode::OK, &TokenResponse::bearer(&token, ttl));
    set_cookie(
        &mut response,
        &token_cookie(&token, ttl, state.secure_cookies),
    );
    response
}

/// Revoke the presented token, if any. Always answers `{}`.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    query: Option<Query<TokenQuery>>,
    headers: HeaderMap,
) -> Response {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    if let Some(token) = presented_token(&query, &headers) {
        match state.store.remove(&token).await {
            Ok(true) => info!("revoked access token"),
            Ok(false) => debug!("logout with unknown token"),
            Err(e) => return server_error(e),
        }
    }
    json_response(StatusCode::OK, &serde_json::json!({}))
}
