//! Prometheus metric definitions.
//!
//! Self-observability metrics live in a long-lived registry. Cost, Kubernetes
//! share and exchange-rate series are rebuilt on every scrape in a
//! `ScrapeSeries`, so concurrent scrapes never see each other's partial writes
//! and keys that vanish upstream disappear from the output.

use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};

use crate::core::aggregate::{Observations, COST_LABELS};
use crate::core::models::exchange::ExchangeRateSet;

const COST_NAMESPACE: &str = "aws_cloud";
const EXPORTER_NAMESPACE: &str = "cloudcost_exporter";

/// Version information reported by `cloudcost_exporter_info`.
#[derive(Debug, Clone, Copy)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub date: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            commit: option_env!("GIT_COMMIT").unwrap_or("none"),
            date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        }
    }
}

#[derive(Clone)]
pub struct ExporterMetrics {
    registry: Registry,
    emit_kube_percent: bool,

    /// Time spent fetching cloud costs from OpenCost
    pub scrape_duration: Histogram,
    pub scrape_errors: IntCounter,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub cache_age: Gauge,
    pub last_successful_scrape: Gauge,
}

impl ExporterMetrics {
    /// Register the self-observability metrics and build info into `registry`.
    pub fn new(
        registry: Registry,
        build: BuildInfo,
        emit_kube_percent: bool,
    ) -> prometheus::Result<Self> {
        let info = GaugeVec::new(
            Opts::new("info", "Build information about the cloudcost exporter")
                .namespace(EXPORTER_NAMESPACE),
            &["version", "commit", "date"],
        )?;
        info.with_label_values(&[build.version, build.commit, build.date])
            .set(1.0);
        registry.register(Box::new(info))?;

        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                "scrape_duration_seconds",
                "Time to fetch cloud costs from OpenCost",
            )
            .namespace(EXPORTER_NAMESPACE),
        )?;
        let scrape_errors = IntCounter::with_opts(
            Opts::new("scrape_errors_total", "Total number of scrape errors")
                .namespace(EXPORTER_NAMESPACE),
        )?;
        let cache_hits = IntCounter::with_opts(
            Opts::new("cache_hits_total", "Total number of cache hits")
                .namespace(EXPORTER_NAMESPACE),
        )?;
        let cache_misses = IntCounter::with_opts(
            Opts::new("cache_misses_total", "Total number of cache misses")
                .namespace(EXPORTER_NAMESPACE),
        )?;
        let cache_age = Gauge::with_opts(
            Opts::new("cache_age_seconds", "Age of cached data in seconds")
                .namespace(EXPORTER_NAMESPACE),
        )?;
        let last_successful_scrape = Gauge::with_opts(
            Opts::new(
                "last_successful_scrape_timestamp",
                "Unix timestamp of last successful scrape",
            )
            .namespace(EXPORTER_NAMESPACE),
        )?;

        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(scrape_errors.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(cache_age.clone()))?;
        registry.register(Box::new(last_successful_scrape.clone()))?;

        Ok(Self {
            registry,
            emit_kube_percent,
            scrape_duration,
            scrape_errors,
            cache_hits,
            cache_misses,
            cache_age,
            last_successful_scrape,
        })
    }

    pub fn mark_successful_scrape(&self) {
        self.last_successful_scrape
            .set(chrono::Utc::now().timestamp_millis() as f64 / 1000.0);
    }

    /// Fresh, empty per-scrape series.
    pub fn new_scrape(&self) -> prometheus::Result<ScrapeSeries> {
        ScrapeSeries::new(self.emit_kube_percent)
    }

    /// Render the long-lived metrics together with one scrape's series.
    pub fn encode(&self, series: &ScrapeSeries) -> prometheus::Result<String> {
        let mut families = self.registry.gather();
        families.extend(series.registry.gather());
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Per-scrape cost, Kubernetes share and exchange-rate gauges.
pub struct ScrapeSeries {
    registry: Registry,
    cost_total: GaugeVec,
    kube_percent: Option<GaugeVec>,
    exchange_rate: GaugeVec,
}

impl ScrapeSeries {
    fn new(emit_kube_percent: bool) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let cost_total = GaugeVec::new(
            Opts::new("cost_total", "AWS cloud cost in USD").namespace(COST_NAMESPACE),
            &COST_LABELS,
        )?;
        registry.register(Box::new(cost_total.clone()))?;

        let kube_percent = if emit_kube_percent {
            let gauge = GaugeVec::new(
                Opts::new(
                    "cost_kubernetes_percent",
                    "Percentage of cost attributed to Kubernetes",
                )
                .namespace(COST_NAMESPACE),
                &COST_LABELS,
            )?;
            registry.register(Box::new(gauge.clone()))?;
            Some(gauge)
        } else {
            None
        };

        let exchange_rate = GaugeVec::new(
            Opts::new(
                "currency_exchange_rate",
                "Currency exchange rate from base to target currency",
            ),
            &["base", "target"],
        )?;
        registry.register(Box::new(exchange_rate.clone()))?;

        Ok(Self {
            registry,
            cost_total,
            kube_percent,
            exchange_rate,
        })
    }

    pub fn record_costs(&self, observations: &Observations<'_>) {
        for obs in &observations.costs {
            self.cost_total
                .with_label_values(&obs.label_values())
                .set(obs.value);
        }
        if let Some(gauge) = &self.kube_percent {
            for obs in &observations.kube_percent {
                gauge.with_label_values(&obs.label_values()).set(obs.value);
            }
        }
    }

    pub fn record_exchange_rates(&self, rates: &ExchangeRateSet) {
        for (target, rate) in &rates.rates {
            self.exchange_rate
                .with_label_values(&[rates.base.as_str(), target.as_str()])
                .set(*rate);
        }
    }
}
