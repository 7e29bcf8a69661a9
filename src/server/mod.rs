//! Development proxy server with live reload.
//!
//! The server listens on a local port and reverse-proxies every request to
//! the configured upstream virtual host. A few paths are served locally:
//!
//! | Path | Purpose |
//! |---|---|
//! | `/__assetflow/client.js` | live-reload client, injected into HTML pages |
//! | `/__assetflow/events` | Server-Sent Events stream of [`ReloadEvent`]s |
//! | `/__assetflow/scroll` | scroll positions posted by connected browsers |

pub mod proxy;
pub mod reload;

pub use reload::{ReloadEvent, Reloader};

use crate::config::{ProxyTarget, ServerConfig};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use regex::Regex;
use serde::Deserialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

/// Path of the injected live-reload client.
pub const CLIENT_PATH: &str = "/__assetflow/client.js";
/// Path of the event stream.
pub const EVENTS_PATH: &str = "/__assetflow/events";
/// Path browsers post scroll positions to.
pub const SCROLL_PATH: &str = "/__assetflow/scroll";

const CLIENT_TEMPLATE: &str = include_str!("client.js");

/// Error starting or running the server.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    /// The listening socket could not be opened
    #[error("Cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The upstream host cannot be turned into a link pattern
    #[error("Invalid proxy host '{0}'")]
    InvalidHost(String),
    /// HTTP client setup failed
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
    /// Serving failed
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings for one server instance.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Upstream host to proxy
    pub proxy: String,
    /// Address to listen on
    pub bind: IpAddr,
    /// Local port; 0 picks a free one
    pub port: u16,
    /// Prefix for log lines and the reload banner
    pub log_prefix: String,
    /// Delay before a reload is broadcast
    pub reload_delay: Duration,
    /// Show a banner after reloads
    pub notify: bool,
    /// Mirror scroll position between browsers
    pub scroll_proportionally: bool,
    /// Minimum interval between scroll updates
    pub scroll_throttle_ms: u32,
}

impl ServerOptions {
    fn for_target(target: &ProxyTarget, config: &ServerConfig) -> Self {
        Self {
            proxy: target.proxy.clone(),
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: target.port,
            log_prefix: config.log_prefix.clone(),
            reload_delay: Duration::from_millis(u64::from(config.reload_delay_ms)),
            notify: config.notify,
            scroll_proportionally: config.scroll_proportionally,
            scroll_throttle_ms: config.scroll_throttle_ms,
        }
    }

    /// Options for the development proxy.
    pub fn dev(config: &ServerConfig) -> Self {
        Self::for_target(&config.dev, config)
    }

    /// Options for the production proxy.
    pub fn dist(config: &ServerConfig) -> Self {
        Self::for_target(&config.dist, config)
    }

    /// The client script with these options filled in.
    pub fn client_script(&self) -> String {
        CLIENT_TEMPLATE
            .replace("__NOTIFY__", if self.notify { "true" } else { "false" })
            .replace("__SCROLL__", if self.scroll_proportionally { "true" } else { "false" })
            .replace("__THROTTLE__", &self.scroll_throttle_ms.to_string())
            .replace("__PREFIX__", &self.log_prefix.replace(['\'', '\\', '<'], ""))
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub options: Arc<ServerOptions>,
    /// Upstream origin, e.g. `http://project.src`
    pub upstream: Arc<str>,
    /// Matches links to the upstream host
    pub link_pattern: Arc<Regex>,
    pub client: reqwest::Client,
    pub reloader: Reloader,
    client_script: Arc<str>,
}

impl AppState {
    /// Build the state for `options`.
    pub fn new(options: ServerOptions, reloader: Reloader) -> Result<Self, ServerError> {
        let upstream = proxy::upstream_origin(&options.proxy);
        let link_pattern = proxy::link_pattern(proxy::origin_host(&upstream))
            .map_err(|_| ServerError::InvalidHost(options.proxy.clone()))?;
        let client = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build()?;

        Ok(Self {
            client_script: options.client_script().into(),
            options: Arc::new(options),
            upstream: upstream.into(),
            link_pattern: Arc::new(link_pattern),
            client,
            reloader,
        })
    }
}

/// Build the router: live-reload endpoints plus the proxy fallback.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CLIENT_PATH, get(client_script))
        .route(EVENTS_PATH, get(events))
        .route(SCROLL_PATH, post(scroll))
        .fallback(proxy::handle)
        .with_state(state)
}

async fn client_script(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8"), (header::CACHE_CONTROL, "no-cache")],
        state.client_script.to_string(),
    )
}

async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.reloader.subscribe();
    tracing::debug!(browsers = state.reloader.subscribers(), "browser connected");

    let stream = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    let sse = Event::default().event(event.name()).data(data);
                    return Some((Ok(sse), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "browser fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct ScrollUpdate {
    id: String,
    ratio: f64,
}

async fn scroll(State(state): State<AppState>, Json(update): Json<ScrollUpdate>) -> StatusCode {
    if !state.options.scroll_proportionally {
        return StatusCode::NOT_FOUND;
    }
    let ratio = if update.ratio.is_finite() { update.ratio.clamp(0.0, 1.0) } else { 0.0 };
    state.reloader.send(ReloadEvent::Scroll { ratio, origin: update.id });
    StatusCode::NO_CONTENT
}

/// A bound, not yet serving, proxy server.
pub struct DevServer {
    listener: TcpListener,
    router: Router,
    options: Arc<ServerOptions>,
    upstream: Arc<str>,
}

impl DevServer {
    /// Open the listening socket.
    pub async fn bind(options: ServerOptions, reloader: Reloader) -> Result<Self, ServerError> {
        let addr = SocketAddr::new(options.bind, options.port);
        let listener = TcpListener::bind(addr).await.map_err(|source| ServerError::Bind { addr, source })?;
        let state = AppState::new(options, reloader)?;

        Ok(Self {
            listener,
            options: Arc::clone(&state.options),
            upstream: Arc::clone(&state.upstream),
            router: router(state),
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Upstream origin being proxied.
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Lines announcing where the server can be reached.
    pub fn banner(&self) -> Vec<String> {
        let port = self.local_addr().map(|a| a.port()).unwrap_or(self.options.port);
        let prefix = &self.options.log_prefix;
        vec![
            format!("[{}] Proxying: {}", prefix, self.upstream),
            format!("[{}] Local: http://localhost:{}", prefix, port),
        ]
    }

    /// Serve until `shutdown` completes.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(prefix = %self.options.log_prefix, upstream = %self.upstream, "serving");
        axum::serve(self.listener, self.router).with_graceful_shutdown(shutdown).await?;
        Ok(())
    }
}

/// Completes on Ctrl+C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
