use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::core::aggregate::{aggregate, observations};
use crate::core::context::CallContext;
use crate::core::client::FetchClient;
use crate::core::metrics::{ExporterMetrics, ScrapeSeries};
use crate::core::refresh::Refresher;

const BASE_CURRENCY: &str = "USD";
const EXCHANGE_RATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces the full metrics payload for one scrape of `/metrics`.
pub struct Collector {
    refresher: Arc<Refresher>,
    client: Arc<FetchClient>,
    metrics: Arc<ExporterMetrics>,
    emit_kube_percent: bool,
    currency_symbols: Vec<String>,
}

impl Collector {
    pub fn new(
        refresher: Arc<Refresher>,
        client: Arc<FetchClient>,
        metrics: Arc<ExporterMetrics>,
    ) -> Self {
        Self {
            refresher,
            client,
            metrics,
            emit_kube_percent: false,
            currency_symbols: vec!["CNY".to_string(), "EUR".to_string()],
        }
    }

    pub fn with_kube_percent_metrics(mut self, enabled: bool) -> Self {
        self.emit_kube_percent = enabled;
        self
    }

    pub fn with_currency_symbols(mut self, symbols: Vec<String>) -> Self {
        self.currency_symbols = symbols;
        self
    }

    pub fn refresher(&self) -> &Arc<Refresher> {
        &self.refresher
    }

    pub async fn scrape(&self) -> prometheus::Result<String> {
        let snapshot = self.refresher.obtain().await;
        self.metrics
            .cache_age
            .set(self.refresher.cache().age().as_secs_f64());

        let series = self.metrics.new_scrape()?;
        if let Some(snapshot) = snapshot {
            let aggregated = aggregate(&snapshot);
            let obs = observations(&aggregated, self.emit_kube_percent);
            debug!(
                keys = aggregated.len(),
                cost_series = obs.costs.len(),
                kube_series = obs.kube_percent.len(),
                "emitting cost metrics"
            );
            series.record_costs(&obs);
            self.record_exchange_rates(&series).await;
        }

        self.metrics.encode(&series)
    }

    async fn record_exchange_rates(&self, series: &ScrapeSeries) {
        if self.currency_symbols.is_empty() {
            return;
        }
        let ctx = CallContext::with_timeout(EXCHANGE_RATE_TIMEOUT);
        match self
            .client
            .fetch_exchange_rates(&ctx, BASE_CURRENCY, &self.currency_symbols)
            .await
        {
            Ok(rates) => series.record_exchange_rates(&rates),
            Err(e) => error!(error = %e, "failed to fetch exchange rates"),
        }
    }
}
