use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::core::cache::{CacheRead, CostCache};
use crate::core::client::FetchError;
use crate::core::context::CallContext;
use crate::core::metrics::ExporterMetrics;
use crate::core::models::cost::Snapshot;

const DEFAULT_FETCH_DEADLINE: Duration = Duration::from_secs(30);

/// Anything that can produce a cost snapshot.
#[async_trait]
pub trait CostSource: Send + Sync {
    async fn fetch_cost(&self, ctx: &CallContext) -> Result<Snapshot, FetchError>;
}

/// Decides per scrape whether to serve the cache, fetch inline, or serve stale
/// data while a single background refresh runs.
pub struct Refresher {
    source: Arc<dyn CostSource>,
    cache: Arc<CostCache>,
    metrics: Arc<ExporterMetrics>,
    fetch_deadline: Duration,
    // Separate from the cache lock: the refresh itself reads and writes the cache.
    refreshing: Mutex<bool>,
    // Held across every upstream fetch so at most one runs at a time.
    fetching: tokio::sync::Mutex<()>,
}

/// Clears the in-flight flag when the background refresh ends, however it ends.
struct InFlight<'a>(&'a Mutex<bool>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.0.lock() = false;
    }
}

impl Refresher {
    pub fn new(
        source: Arc<dyn CostSource>,
        cache: Arc<CostCache>,
        metrics: Arc<ExporterMetrics>,
    ) -> Self {
        Self {
            source,
            cache,
            metrics,
            fetch_deadline: DEFAULT_FETCH_DEADLINE,
            refreshing: Mutex::new(false),
            fetching: tokio::sync::Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &Arc<CostCache> {
        &self.cache
    }

    pub fn is_refreshing(&self) -> bool {
        *self.refreshing.lock()
    }

    /// The snapshot this scrape should observe, if any.
    ///
    /// Fresh data is returned as is. Stale data is returned immediately and a
    /// background refresh is started unless one is already running. On a miss
    /// the fetch happens inline; a failure returns `None` and leaves the cache
    /// untouched. Scrapes that miss together wait for a single fetch.
    pub async fn obtain(self: &Arc<Self>) -> Option<Arc<Snapshot>> {
        match self.cache.get() {
            CacheRead::Fresh(snapshot) => {
                self.metrics.cache_hits.inc();
                Some(snapshot)
            }
            CacheRead::Stale(snapshot) => {
                self.metrics.cache_hits.inc();
                self.spawn_refresh();
                Some(snapshot)
            }
            CacheRead::Miss => {
                self.metrics.cache_misses.inc();
                let _fetching = self.fetching.lock().await;
                if let Some(snapshot) = self.cache.peek().snapshot() {
                    debug!("cache filled by a concurrent fetch");
                    return Some(Arc::clone(snapshot));
                }
                self.fetch_and_cache().await
            }
        }
    }

    fn spawn_refresh(self: &Arc<Self>) {
        {
            let mut refreshing = self.refreshing.lock();
            if *refreshing {
                debug!("background refresh already in flight, serving stale data");
                return;
            }
            *refreshing = true;
        }

        debug!(age = ?self.cache.age(), "cache stale, starting background refresh");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _in_flight = InFlight(&this.refreshing);
            let _fetching = this.fetching.lock().await;
            if matches!(this.cache.peek(), CacheRead::Fresh(_)) {
                return;
            }
            this.fetch_and_cache().await;
        });
    }

    async fn fetch_and_cache(&self) -> Option<Arc<Snapshot>> {
        let started = Instant::now();
        let ctx = CallContext::with_timeout(self.fetch_deadline);
        let result = self.source.fetch_cost(&ctx).await;
        self.metrics
            .scrape_duration
            .observe(started.elapsed().as_secs_f64());

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.cache.set(Arc::clone(&snapshot));
                self.metrics.mark_successful_scrape();
                info!(
                    sets = snapshot.data.sets.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "fetched cloud costs"
                );
                Some(snapshot)
            }
            Err(e) => {
                self.metrics.scrape_errors.inc();
                error!(error = %e, "failed to fetch cloud costs");
                None
            }
        }
    }
}
