use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::builder::BoolishValueParser;
use clap::Args;
use prometheus::Registry;

use crate::core::cache::CostCache;
use crate::core::client::FetchClient;
use crate::core::collector::Collector;
use crate::core::config::{parse_symbols, ExporterConfig};
use crate::core::context::CallContext;
use crate::core::metrics::{BuildInfo, ExporterMetrics};
use crate::core::refresh::Refresher;

const READY_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings that override the config file, usually supplied through the environment.
#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// OpenCost service URL
    #[arg(long, global = true, env = "OPENCOST_URL")]
    pub opencost_url: Option<String>,

    /// Metrics server port
    #[arg(long, global = true, env = "PORT")]
    pub port: Option<u16>,

    /// Time window for cost queries
    #[arg(long, global = true, env = "WINDOW")]
    pub window: Option<String>,

    /// How long fetched data counts as fresh (e.g. 1h)
    #[arg(long, global = true, env = "CACHE_TTL")]
    pub cache_ttl: Option<String>,

    /// How long past the TTL stale data may still be served (e.g. 6h)
    #[arg(long, global = true, env = "MAX_STALE")]
    pub max_stale: Option<String>,

    /// Retries per OpenCost fetch
    #[arg(long, global = true, env = "MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Emit the kubernetes percent metric
    #[arg(
        long,
        global = true,
        env = "EMIT_KUBE_PERCENT_METRICS",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub emit_kube_percent_metrics: Option<bool>,

    /// Comma-separated target currency symbols for exchange rates
    #[arg(long, global = true, env = "CURRENCY_SYMBOLS")]
    pub currency_symbols: Option<String>,

    /// Log level (debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format (json or text)
    #[arg(long, global = true, env = "LOG_FORMAT")]
    pub log_format: Option<String>,
}

impl ServeArgs {
    pub fn apply(&self, config: &mut ExporterConfig) {
        if let Some(v) = &self.opencost_url {
            config.opencost_url = v.clone();
        }
        if let Some(v) = self.port {
            config.port = v;
        }
        if let Some(v) = &self.window {
            config.window = v.clone();
        }
        if let Some(v) = &self.cache_ttl {
            config.cache_ttl = v.clone();
        }
        if let Some(v) = &self.max_stale {
            config.max_stale = v.clone();
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = self.emit_kube_percent_metrics {
            config.emit_kube_percent_metrics = v;
        }
        if let Some(v) = &self.currency_symbols {
            config.currency_symbols = parse_symbols(v);
        }
        if let Some(v) = &self.log_level {
            config.log_level = v.clone();
        }
        if let Some(v) = &self.log_format {
            config.log_format = v.clone();
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    collector: Arc<Collector>,
    client: Arc<FetchClient>,
    cache: Arc<CostCache>,
}

impl AppState {
    /// Wire client, cache, refresher and collector from a validated config.
    pub fn from_config(config: &ExporterConfig, registry: Registry) -> Result<Self> {
        let client = Arc::new(
            FetchClient::new(&config.opencost_url, config.request_timeout()?)
                .context("Failed to build HTTP client")?
                .with_window(&config.window)
                .with_max_retries(config.max_retries)
                .with_exchange_rate_url(&config.exchange_rate_url),
        );
        let cache = Arc::new(CostCache::new(config.cache_ttl()?, config.max_stale()?));
        let metrics = Arc::new(
            ExporterMetrics::new(
                registry,
                BuildInfo::current(),
                config.emit_kube_percent_metrics,
            )
            .context("Failed to register metrics")?,
        );
        let refresher = Arc::new(Refresher::new(
            client.clone(),
            cache.clone(),
            metrics.clone(),
        ));
        let collector = Collector::new(refresher, client.clone(), metrics)
            .with_kube_percent_metrics(config.emit_kube_percent_metrics)
            .with_currency_symbols(config.currency_symbols.clone());

        Ok(Self {
            collector: Arc::new(collector),
            client,
            cache,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.collector.scrape().await {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Ready once data is cached; before that, only if OpenCost answers.
async fn readyz_handler(State(state): State<AppState>) -> Response {
    if !state.cache.is_populated() {
        let ctx = CallContext::with_timeout(READY_PING_TIMEOUT);
        if let Err(e) = state.client.ping(&ctx).await {
            return (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}", e)).into_response();
        }
    }
    (StatusCode::OK, "ready").into_response()
}

pub async fn run(config: ExporterConfig) -> Result<()> {
    let build = BuildInfo::current();
    tracing::info!(
        version = build.version,
        commit = build.commit,
        date = build.date,
        opencost_url = %config.opencost_url,
        port = config.port,
        window = %config.window,
        cache_ttl = %config.cache_ttl,
        max_stale = %config.max_stale,
        "starting cloudcost-exporter"
    );

    let state = AppState::from_config(&config, Registry::new())?;
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(addr = %addr, "server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down server");
}
