//! Token endpoint server.
//!
//! Endpoints are mounted individually on paths chosen by the embedding
//! application, which adds its own routes guarded by
//! [`guard::AuthenticatedUser`].

pub mod guard;
pub mod login;
pub mod page;
pub mod response;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, MethodRouter};
use axum::Router;
use basic_oauth::{Authenticator, MemoryTokenStore, TokenStore};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, DEFAULT_TOKEN_TTL};
use crate::error::{ServerError, ServerResult};

/// How often expired sessions are dropped from the store.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// State shared by every handler.
pub struct AppState {
    pub authenticator: Arc<dyn Authenticator>,
    pub store: Arc<dyn TokenStore>,
    pub token_ttl: Duration,
    /// Mark the token cookie `Secure`.
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(authenticator: Arc<dyn Authenticator>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            authenticator,
            store,
            token_ttl: DEFAULT_TOKEN_TTL,
            secure_cookies: true,
        }
    }

    /// State backed by the configured credential list and an in-memory store.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            authenticator: Arc::new(config.credentials.clone()),
            store: Arc::new(MemoryTokenStore::new()),
            token_ttl: config.token_ttl,
            secure_cookies: config.secure_cookies,
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }
}

/// Mountable endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `POST`: exchange a password grant for a token.
    Login,
    /// `GET`: revoke a token.
    Logout,
    /// `GET`: HTML page with an oauth login form.
    Page,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Login => "login",
            Endpoint::Logout => "logout",
            Endpoint::Page => "page",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Endpoint::Login => Method::POST,
            Endpoint::Logout | Endpoint::Page => Method::GET,
        }
    }
}

impl FromStr for Endpoint {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(Endpoint::Login),
            "logout" => Ok(Endpoint::Logout),
            "page" => Ok(Endpoint::Page),
            other => Err(ServerError::UnknownEndpoint(other.to_string())),
        }
    }
}

/// Parse a `name=/path` mount specification.
pub fn parse_mount(spec: &str) -> ServerResult<(Endpoint, String)> {
    let (name, path) = spec
        .split_once('=')
        .ok_or_else(|| ServerError::Config(format!("mount '{spec}' must look like name=/path")))?;
    if !path.starts_with('/') {
        return Err(ServerError::Config(format!(
            "mount path '{path}' must start with '/'"
        )));
    }
    Ok((name.parse()?, path.to_string()))
}

/// Builder for the token endpoint router.
pub struct OAuthRouter {
    state: Arc<AppState>,
    mounts: Vec<(Endpoint, String)>,
    extra: Router<Arc<AppState>>,
    extra_paths: Vec<String>,
    cors: Option<CorsLayer>,
}

impl OAuthRouter {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            mounts: Vec::new(),
            extra: Router::new(),
            extra_paths: Vec::new(),
            cors: None,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Mount `endpoint` at `path`.
    pub fn mount(mut self, endpoint: Endpoint, path: impl Into<String>) -> Self {
        self.mounts.push((endpoint, path.into()));
        self
    }

    /// Mount an endpoint by name, failing for unknown names.
    pub fn mount_named(self, name: &str, path: impl Into<String>) -> ServerResult<Self> {
        let endpoint = name.parse()?;
        Ok(self.mount(endpoint, path))
    }

    /// Add an application route. Use [`guard::AuthenticatedUser`] in the
    /// handler to require a token.
    pub fn route(mut self, path: &str, method_router: MethodRouter<Arc<AppState>>) -> Self {
        self.extra = self.extra.route(path, method_router);
        self.extra_paths.push(path.to_string());
        self
    }

    /// Allow cross-origin token requests from `origin`.
    pub fn allow_origin(mut self, origin: &str) -> ServerResult<Self> {
        let origin = HeaderValue::from_str(origin)
            .map_err(|_| ServerError::Config(format!("invalid allowed origin '{origin}'")))?;
        self.cors = Some(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_credentials(true),
        );
        Ok(self)
    }

    /// Build the axum router.
    ///
    /// Fails if a mount path is malformed, is used twice for the same
    /// method, or is also an application route, and if the page is mounted
    /// without a login endpoint for its form to post to.
    pub fn into_router(self) -> ServerResult<Router> {
        self.check_mounts()?;

        let login_path = self
            .mounts
            .iter()
            .find(|(e, _)| *e == Endpoint::Login)
            .map(|(_, p)| p.clone())
            .unwrap_or_default();

        let mut router = self.extra;
        for (endpoint, path) in &self.mounts {
            debug!(endpoint = endpoint.name(), %path, "mounting endpoint");
            router = match endpoint {
                Endpoint::Login => router.route(path, post(login::login)),
                Endpoint::Logout => router.route(path, get(login::logout)),
                Endpoint::Page => {
                    let action = login_path.clone();
                    router.route(
                        path,
                        get(move || {
                            let action = action.clone();
                            async move { page::render_login_page(&action) }
                        }),
                    )
                }
            };
        }

        if let Some(cors) = self.cors {
            router = router.layer(cors);
        }
        Ok(router.with_state(self.state))
    }

    fn check_mounts(&self) -> ServerResult<()> {
        let mut taken = HashSet::new();
        for (endpoint, path) in &self.mounts {
            if !path.starts_with('/') {
                return Err(ServerError::Config(format!(
                    "{} mount path '{path}' must start with '/'",
                    endpoint.name()
                )));
            }
            if self.extra_paths.iter().any(|p| p == path) {
                return Err(ServerError::Config(format!(
                    "{} mount '{path}' collides with an application route",
                    endpoint.name()
                )));
            }
            if !taken.insert((endpoint.method(), path.as_str())) {
                return Err(ServerError::Config(format!(
                    "{} {path} is mounted more than once",
                    endpoint.method()
                )));
            }
        }

        let mounted = |wanted: Endpoint| self.mounts.iter().any(|(e, _)| *e == wanted);
        if mounted(Endpoint::Page) && !mounted(Endpoint::Login) {
            return Err(ServerError::Config(
                "the page endpoint needs the login endpoint mounted".to_string(),
            ));
        }
        Ok(())
    }
}

/// Periodically drop expired sessions from `store`.
pub fn spawn_session_purger(store: Arc<dyn TokenStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = store.purge_expired().await {
                warn!("session purge failed: {e}");
            }
        }
    })
}

/// Serve `router` on `addr` until Ctrl-C.
pub async fn serve(addr: &str, router: Router, store: Arc<dyn TokenStore>) -> ServerResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("token endpoint listening on http://{}", listener.local_addr()?);

    let purger = spawn_session_purger(store, PURGE_INTERVAL);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await?;

    purger.abort();
    Ok(())
}
