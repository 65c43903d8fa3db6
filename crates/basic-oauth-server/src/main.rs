//! basic-oauth command line: run the token endpoint or log in through a page.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use axum::routing::get;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::Value;

use basic_oauth_client::{
    FormId, FormInterceptor, HandlerSlot, InterceptorConfig, Page, ReqwestTransport,
    SubmitOutcome, Transport,
};
use basic_oauth_server::config::{self, ServerConfig};
use basic_oauth_server::{parse_mount, AppState, AuthenticatedUser, Endpoint, OAuthRouter};

#[derive(Parser)]
#[command(
    name = "basic-oauth",
    about = "OAuth v2 password grant: token endpoint and form login client",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the token endpoint.
    Serve {
        /// Listen address (host:port). Also reads BASIC_OAUTH_ADDR.
        #[arg(long)]
        addr: Option<String>,

        /// Token lifetime in seconds. Also reads BASIC_OAUTH_TOKEN_TTL.
        #[arg(long)]
        token_ttl: Option<u64>,

        /// Accepted credential as user:password. Can be repeated.
        /// Also reads BASIC_OAUTH_CREDENTIALS (comma separated).
        #[arg(long = "credential")]
        credentials: Vec<String>,

        /// Do not mark the token cookie Secure (plain http deployments).
        #[arg(long)]
        insecure_cookies: bool,

        /// Allow cross-origin token requests from this origin.
        #[arg(long)]
        allow_origin: Option<String>,

        /// Mount an endpoint as name=/path (login, logout, page). Can be
        /// repeated; defaults to login=/login logout=/logout page=/signin.
        #[arg(long = "mount")]
        mounts: Vec<String>,
    },

    /// Log in through the oauth form of a page and print the response.
    Login {
        /// URL of the page carrying the login form.
        url: String,

        #[arg(long, short)]
        username: String,

        #[arg(long, short)]
        password: String,

        /// Which oauth form of the page to submit, counting from 0.
        #[arg(long, default_value = "0")]
        form: usize,

        /// Request timeout in seconds.
        #[arg(long, default_value = "15")]
        timeout: u64,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            addr,
            token_ttl,
            credentials,
            insecure_cookies,
            allow_origin,
            mounts,
        } => {
            let config = ServerConfig {
                addr: config::resolve_addr(addr.as_deref()),
                token_ttl: config::resolve_token_ttl(token_ttl)?,
                secure_cookies: config::resolve_secure_cookies(insecure_cookies),
                allow_origin: config::resolve_allow_origin(allow_origin.as_deref()),
                credentials: config::resolve_credentials(&credentials)?,
            };
            run_server(config, &mounts).await?;
        }

        Commands::Login {
            url,
            username,
            password,
            form,
            timeout,
        } => {
            run_login(&url, &username, &password, form, Duration::from_secs(timeout)).await?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "basic-oauth", &mut std::io::stdout());
        }
    }

    Ok(())
}

async fn run_server(config: ServerConfig, mounts: &[String]) -> anyhow::Result<()> {
    if config.credentials.is_empty() {
        tracing::warn!("no credentials configured, every login will be rejected");
    }
    if !config.secure_cookies {
        tracing::warn!("token cookie is not marked Secure");
    }

    let state = Arc::new(AppState::from_config(&config));
    let store = Arc::clone(&state.store);

    let mut router = OAuthRouter::new(state).route("/", get(hello));
    if mounts.is_empty() {
        router = router
            .mount(Endpoint::Login, "/login")
            .mount(Endpoint::Logout, "/logout")
            .mount(Endpoint::Page, "/signin");
    } else {
        for spec in mounts {
            let (endpoint, path) = parse_mount(spec)?;
            router = router.mount(endpoint, path);
        }
    }
    if let Some(origin) = &config.allow_origin {
        router = router.allow_origin(origin)?;
    }

    basic_oauth_server::serve(&config.addr, router.into_router()?, store).await?;
    Ok(())
}

/// Requires a valid token.
async fn hello(user: AuthenticatedUser) -> String {
    format!("Hello user {}!\n", user.user_id)
}

async fn run_login(
    url: &str,
    username: &str,
    password: &str,
    nth: usize,
    timeout: Duration,
) -> anyhow::Result<()> {
    let transport = Arc::new(ReqwestTransport::new(timeout)?);

    let fetched = transport
        .fetch_page(url)
        .await
        .with_context(|| format!("failed to load {url}"))?;
    let mut page = Page::parse(&fetched.body, &fetched.final_url)?;

    let config = InterceptorConfig::default();
    let Some(form_id) = page
        .forms_with_class(&config.form_class)
        .nth(nth)
        .map(|f| f.id)
    else {
        bail!("{url} has no {} number {nth}", config.selector());
    };

    fill_credentials(&mut page, form_id, username, password)?;

    let handlers = HandlerSlot::with_handler(|response: &Value| {
        match serde_json::to_string_pretty(response) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!("cannot print response: {e}"),
        }
    });
    let transport: Arc<dyn Transport> = transport;
    let mut interceptor = FormInterceptor::new(config, Some(transport), handlers);
    interceptor.attach(&page);

    match interceptor.submit(&page, form_id) {
        SubmitOutcome::Intercepted(exchange) => {
            let completion = exchange.wait().await?;
            tracing::debug!(status = completion.status, "token exchange finished");
            Ok(())
        }
        SubmitOutcome::Native => bail!("form {form_id} was not intercepted"),
    }
}

fn fill_credentials(
    page: &mut Page,
    form_id: FormId,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    let form = page
        .form_mut(form_id)
        .with_context(|| format!("{form_id} disappeared"))?;
    for (name, value) in [("username", username), ("password", password)] {
        if !form.set_value(name, value) {
            tracing::warn!("{form_id} has no '{name}' field");
        }
    }
    Ok(())
}
