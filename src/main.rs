#![cfg_attr(test, allow(clippy::unwrap_used))]

mod log_once;

mod config;
mod discovery;
mod error;
mod headers;
mod humanfmt;
mod metalink;
mod proxy;
mod registry;
mod rules;
mod transport;

use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

use anyhow::Context as _;
use bytes::Bytes;
use clap::Parser;
use http_body_util::combinators::BoxBody;
use hyper::Request;
use hyper::Response;
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{LevelFilter, debug, error, info, trace, warn};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use tokio::net::TcpListener;
use tokio::runtime::Builder;
use tokio::signal::unix::SignalKind;

use crate::config::Config;
use crate::error::RemirrorError;
use crate::registry::Registry;
use crate::transport::Transports;

pub(crate) const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub(crate) const APP_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

static CONFIG: OnceLock<Config> = OnceLock::new();

#[must_use]
pub(crate) fn global_config() -> &'static Config {
    CONFIG.get().expect("global was initialized in main()")
}

#[derive(Clone)]
pub(crate) struct State {
    pub(crate) transports: Arc<Transports>,
    pub(crate) registry: Registry,
}

async fn handle_request_wrapper(
    client: SocketAddr,
    req: Request<Incoming>,
    state: State,
) -> Result<Response<BoxBody<Bytes, RemirrorError>>, RemirrorError> {
    Ok(handle_request(client, req, state).await)
}

/// Dispatches by the host the client addressed: the two discovery hosts get
/// their rewriting handlers, everything else is routed by URL-path prefix.
async fn handle_request(
    client: SocketAddr,
    req: Request<Incoming>,
    state: State,
) -> Response<BoxBody<Bytes, RemirrorError>> {
    trace!("Incoming request: {req:?}");

    let host = req
        .uri()
        .authority()
        .map(|a| a.host().to_owned())
        .or_else(|| {
            req.headers()
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .map(|h| h.split(':').next().unwrap_or(h).to_owned())
        });

    info!(
        "{} http://{}{} for client {}",
        req.method(),
        host.as_deref().unwrap_or("-"),
        req.uri().path(),
        client.ip()
    );

    match host.as_deref() {
        Some(discovery::FEDORA_HOST) => discovery::fedora_metalink(req, &state).await,
        Some(discovery::CENTOS_HOST) => discovery::centos_mirrorlist(req).await,
        _ => proxy::serve_mirror_request(client, req, state).await,
    }
}

/// Creates the data directory and sweeps temporary files a previous
/// instance left behind after a crash.
fn prepare_data_dir(data: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(data)
        .with_context(|| format!("Failed to create directory `{}`", data.display()))?;

    for entry in std::fs::read_dir(data)
        .with_context(|| format!("Failed to inspect directory `{}`", data.display()))?
    {
        let entry = entry?;
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with(proxy::TMP_PREFIX)
        {
            info!(
                "Removing stale temporary file `{}`",
                entry.path().display()
            );
            std::fs::remove_file(entry.path()).with_context(|| {
                format!("Failed to remove stale entry `{}`", entry.path().display())
            })?;
        }
    }

    Ok(())
}

async fn main_loop() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = global_config();

    let listener = TcpListener::bind(config.listen).await.map_err(|err| {
        error!("Error binding on {}:  {err}", config.listen);
        err
    })?;
    info!("Listening on http://{}", config.listen);

    let state = State {
        transports: Arc::new(Transports::new(config)),
        registry: Registry::new(),
    };

    let mut term_signal = tokio::signal::unix::signal(SignalKind::terminate())?;

    loop {
        let next = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT received, stopping...");
                return Ok(());
            },
            _ = term_signal.recv() => {
                info!("SIGTERM received, stopping...");
                return Ok(());
            },
            n = listener.accept() => n
        };

        let (stream, client) = next.map_err(|err| {
            error!("Error accepting connection:  {err}");
            err
        })?;

        debug!("New client connection from {}", client.ip());

        let connection_state = state.clone();
        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(
                    TokioIo::new(stream),
                    service_fn(move |req| {
                        handle_request_wrapper(client, req, connection_state.clone())
                    }),
                )
                .await
            {
                if err.is_incomplete_message() {
                    debug!("Connection to client {} cancelled", client.ip());
                } else {
                    warn!(
                        "Error serving connection for client {}:  {err}",
                        client.ip()
                    );
                }
            }
        });
    }
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Logging level
    #[arg(short, long, value_name = "SEVERITY")]
    log_level: Option<LevelFilter>,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "PATH")]
    config_path: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Cli::parse();

    let config = Config::load(args.config_path.as_deref())?;

    CONFIG.set(config).expect("initial set should succeed");

    TermLogger::init(
        args.log_level.unwrap_or(LevelFilter::Info),
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    debug!("Logger initialized");
    debug!("Configuration: {:?}", global_config());

    info!(
        "Using data directory `{}`",
        global_config().data.display()
    );

    prepare_data_dir(&global_config().data).map_err(|err| {
        error!("Error during setup:  {err}");
        err
    })?;

    scopeguard::defer! {
        info!("Stopped.");
    }

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("remirror-w")
        .build()
        .expect("runtime should build");

    runtime.block_on(main_loop())
}
