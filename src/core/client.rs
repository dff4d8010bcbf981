use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::context::CallContext;
use crate::core::models::cost::Snapshot;
use crate::core::models::exchange::ExchangeRateSet;
use crate::core::refresh::CostSource;

/// Default Frankfurter endpoint for currency exchange rates.
pub const DEFAULT_EXCHANGE_RATE_URL: &str = "https://api.frankfurter.dev/v1/latest";

const BODY_PREVIEW_LIMIT: usize = 500;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("do request: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unhealthy: status {0}")]
    Unhealthy(u16),
    #[error("decode response: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("after {retries} retries: {source}")]
    RetriesExhausted {
        retries: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Malformed bodies are retried along with transport and status failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::Decode(_)
        )
    }
}

/// HTTP client for the OpenCost `cloudCost` API and the exchange-rate API.
#[derive(Debug, Clone)]
pub struct FetchClient {
    base_url: String,
    http: reqwest::Client,
    window: String,
    max_retries: u32,
    backoff_base: Duration,
    exchange_rate_url: String,
}

impl FetchClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Transport)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            window: "1d".to_string(),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            exchange_rate_url: DEFAULT_EXCHANGE_RATE_URL.to_string(),
        })
    }

    pub fn with_window(mut self, window: &str) -> Self {
        self.window = window.to_string();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before the first retry; each further retry doubles it.
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_exchange_rate_url(mut self, url: &str) -> Self {
        self.exchange_rate_url = url.to_string();
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", self.base_url, e)))
    }

    fn cost_url(&self) -> Result<Url, FetchError> {
        let mut url = self.endpoint("/cloudCost")?;
        url.query_pairs_mut().append_pair("window", &self.window);
        Ok(url)
    }

    fn backoff_for(&self, retry: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }

    /// Fetch cloud costs for the configured window, retrying failed attempts
    /// with exponential backoff. Cancellation stops retrying immediately.
    pub async fn fetch_cost(&self, ctx: &CallContext) -> Result<Snapshot, FetchError> {
        let url = self.cost_url()?;
        let mut retry = 0;
        loop {
            match self.attempt::<Snapshot>(ctx, &url).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if retry >= self.max_retries => {
                    return Err(FetchError::RetriesExhausted {
                        retries: self.max_retries,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    retry += 1;
                    let backoff = self.backoff_for(retry);
                    warn!(
                        attempt = retry,
                        max_retries = self.max_retries,
                        backoff = ?backoff,
                        last_error = %err,
                        "retrying OpenCost API request"
                    );
                    tokio::select! {
                        biased;
                        cancelled = ctx.done() => return Err(cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        url: &Url,
    ) -> Result<T, FetchError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        let result = tokio::select! {
            biased;
            cancelled = ctx.done() => return Err(cancelled),
            result = self.get_json::<T>(url.clone()) => result,
        };
        match result {
            Err(err) => Err(ctx.err().unwrap_or(err)),
            ok => ok,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        debug!(method = "GET", url = %url, "sending HTTP request");

        let response = self
            .http
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                debug!(method = "GET", url = %url, error = %e, "HTTP request failed");
                FetchError::Transport(e)
            })?;

        let status = response.status();
        let body = response.bytes().await.map_err(FetchError::Transport)?;
        let text = String::from_utf8_lossy(&body);
        debug!(
            status_code = status.as_u16(),
            content_length = body.len(),
            body_preview = %preview(&text),
            "received HTTP response"
        );

        if status != StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: text.into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(FetchError::Decode)
    }

    /// Check that the OpenCost API answers its health endpoint.
    pub async fn ping(&self, ctx: &CallContext) -> Result<(), FetchError> {
        let url = self.endpoint("/healthz")?;
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        debug!(method = "GET", url = %url, "sending HTTP request");

        let response = tokio::select! {
            biased;
            cancelled = ctx.done() => return Err(cancelled),
            response = self.http.get(url.clone()).send() => response.map_err(FetchError::Transport)?,
        };

        debug!(status_code = response.status().as_u16(), "received HTTP response");
        if response.status() != StatusCode::OK {
            return Err(FetchError::Unhealthy(response.status().as_u16()));
        }
        Ok(())
    }

    /// Fetch exchange rates from `base` into each of `symbols`. Single attempt.
    pub async fn fetch_exchange_rates(
        &self,
        ctx: &CallContext,
        base: &str,
        symbols: &[String],
    ) -> Result<ExchangeRateSet, FetchError> {
        let mut url = Url::parse(&self.exchange_rate_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", self.exchange_rate_url, e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("base", base);
            if !symbols.is_empty() {
                query.append_pair("symbols", &symbols.join(","));
            }
        }

        let rates: ExchangeRateSet = self.attempt(ctx, &url).await?;
        debug!(base = %rates.base, date = %rates.date, rates = ?rates.rates, "parsed exchange rates");
        Ok(rates)
    }
}

#[async_trait]
impl CostSource for FetchClient {
    async fn fetch_cost(&self, ctx: &CallContext) -> Result<Snapshot, FetchError> {
        FetchClient::fetch_cost(self, ctx).await
    }
}

fn preview(body: &str) -> Cow<'_, str> {
    match body.char_indices().nth(BODY_PREVIEW_LIMIT) {
        Some((idx, _)) => Cow::Owned(format!("{}... (truncated)", &body[..idx])),
        None => Cow::Borrowed(body),
    }
}
