use crate::config::CrawlConfig;
use crate::data::MetricsStore;
use crate::metrics::{MetricsRecord, RunMetrics};
use crate::report::write_table;
use crate::table::WideCategoryTable;
use indicatif::{ProgressBar, ProgressStyle};
use shelfmap_scanner::error::{Result, ScanError};
use shelfmap_scanner::{
    BrowserSession, ChromiumSession, FacetClient, FacetSource, LevelExpander, LinkCache,
    MenuDiscovery, RootCategory, RootResolver, SeenIdSet,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Callback for reporting crawl progress
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Init,
    MenuDiscovered,
    RootsResolved,
    /// Expanding the given depth.
    Expanding(usize),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelStats {
    pub depth: usize,
    pub requested: usize,
    pub children: usize,
    pub failures: usize,
    pub duplicates_dropped: usize,
}

/// What a crawl accumulated, including after a fatal collaborator failure.
#[derive(Debug)]
pub struct CrawlReport {
    pub state: CrawlState,
    pub table: WideCategoryTable,
    pub reached_depth: usize,
    pub links_discovered: usize,
    pub roots: usize,
    pub cache_hits: usize,
    pub resolved: usize,
    pub redirected: usize,
    pub excluded: usize,
    pub levels: Vec<LevelStats>,
    pub errors: usize,
    pub cache: LinkCache,
    pub cache_flushed: bool,
    pub fatal: Option<ScanError>,
}

impl CrawlReport {
    fn new(cache: LinkCache) -> Self {
        Self {
            state: CrawlState::Init,
            table: WideCategoryTable::default(),
            reached_depth: 0,
            links_discovered: 0,
            roots: 0,
            cache_hits: 0,
            resolved: 0,
            redirected: 0,
            excluded: 0,
            levels: Vec::new(),
            errors: 0,
            cache,
            cache_flushed: false,
            fatal: None,
        }
    }

    /// Errors as reported in run metrics; a fatal failure counts once.
    pub fn total_errors(&self) -> usize {
        self.errors + usize::from(self.fatal.is_some())
    }
}

/// Drives discovery, resolution and level expansion for one run.
pub struct CrawlOrchestrator<'a, B: BrowserSession + ?Sized> {
    config: &'a CrawlConfig,
    browser: &'a mut B,
    facets: Arc<dyn FacetSource>,
    progress: Option<CrawlProgressCallback>,
    state: CrawlState,
}

impl<'a, B: BrowserSession + ?Sized> CrawlOrchestrator<'a, B> {
    pub fn new(config: &'a CrawlConfig, browser: &'a mut B, facets: Arc<dyn FacetSource>) -> Self {
        Self {
            config,
            browser,
            facets,
            progress: None,
            state: CrawlState::Init,
        }
    }

    pub fn with_progress(mut self, callback: CrawlProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn notify(&self, message: impl Into<String>) {
        if let Some(ref callback) = self.progress {
            callback(message.into());
        }
    }

    /// Run the crawl. Only an invalid configuration is returned as an error,
    /// before any navigation; every other failure ends up in the report.
    pub async fn run(mut self) -> Result<CrawlReport> {
        self.config.validate()?;

        let mut load_errors = 0;
        let cache = match LinkCache::load(&self.config.cache_path) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("{}; continuing with an empty link cache", e);
                load_errors += 1;
                LinkCache::empty(&self.config.cache_path)
            }
        };
        let mut report = CrawlReport::new(cache);
        report.errors += load_errors;

        info!(
            "Extracting the category tree with depth {}",
            self.config.max_depth
        );

        let links = match self.discover(&mut report).await {
            Ok(links) => links,
            Err(e) => return Ok(self.abort(report, e).await),
        };
        self.state = CrawlState::MenuDiscovered;

        let (roots, fatal) = self.resolve(&links, &mut report).await;

        match report.cache.flush() {
            Ok(written) => report.cache_flushed = written,
            Err(e) => {
                error!("Failed to save link cache: {}", e);
                report.errors += 1;
            }
        }

        report.table = WideCategoryTable::from_roots(&roots);
        report.roots = roots.len();

        if let Some(e) = fatal {
            return Ok(self.abort(report, e).await);
        }

        self.close_browser().await;
        self.state = CrawlState::RootsResolved;

        let mut seen = SeenIdSet::new();
        for root in &roots {
            seen.insert(root.id.clone());
        }

        if self.config.expansion_levels() == 0 {
            info!(
                "Depth {} requested, not extracting subcategories",
                self.config.max_depth
            );
        }

        self.expand(&mut report, &mut seen).await;

        self.state = CrawlState::Done;
        report.state = self.state;
        info!(
            "Category extraction finished at depth {} with {} rows",
            report.reached_depth,
            report.table.len()
        );
        Ok(report)
    }

    async fn discover(&mut self, report: &mut CrawlReport) -> Result<Vec<String>> {
        self.notify("Discovering menu links...");
        let discovery = MenuDiscovery::new(&mut *self.browser, &self.config.menu)
            .discover()
            .await?;
        report.errors += discovery.errors;

        let mut links: Vec<String> = discovery.links.into_iter().collect();
        links.sort();
        report.links_discovered = links.len();
        Ok(links)
    }

    /// Resolved roots, plus the fatal error that cut resolution short, if any.
    async fn resolve(
        &mut self,
        links: &[String],
        report: &mut CrawlReport,
    ) -> (Vec<RootCategory>, Option<ScanError>) {
        self.notify(format!("Resolving {} links to root categories...", links.len()));
        let set = RootResolver::new(&mut *self.browser, &self.config.resolver)
            .resolve_all(links, &mut report.cache)
            .await;

        report.cache_hits = set.cache_hits;
        report.resolved = set.resolved;
        report.redirected = set.redirected;
        report.excluded = set.excluded;
        report.errors += set.errors;
        (set.roots, set.fatal)
    }

    async fn expand(&mut self, report: &mut CrawlReport, seen: &mut SeenIdSet) {
        let expander = LevelExpander::new(self.facets.clone(), self.config.expander.clone());

        for depth in 1..=self.config.expansion_levels() {
            self.state = CrawlState::Expanding(depth);
            let frontier = report.table.frontier(depth - 1);
            self.notify(format!(
                "Expanding depth {} ({} categories)...",
                depth,
                frontier.len()
            ));

            let level = match expander.expand(&frontier, seen).await {
                Ok(level) => level,
                Err(e) if e.is_fatal() => {
                    error!("Facet API lost while expanding depth {}: {}", depth, e);
                    report.fatal = Some(e);
                    break;
                }
                Err(e) => {
                    error!("Expansion of depth {} failed: {}", depth, e);
                    report.errors += 1;
                    break;
                }
            };

            report.errors += level.failures;
            report.levels.push(LevelStats {
                depth,
                requested: level.requested,
                children: level.children.len(),
                failures: level.failures,
                duplicates_dropped: level.duplicates_dropped,
            });

            if level.children.is_empty() {
                info!(
                    "Maximum depth reached at {}, no new categories at depth {}",
                    depth - 1,
                    depth
                );
                break;
            }

            let matched = report.table.merge(&level.children, depth);
            report.reached_depth = depth;
            info!("Depth {} merged: {} rows gained a subcategory", depth, matched);
        }
    }

    async fn abort(mut self, mut report: CrawlReport, e: ScanError) -> CrawlReport {
        error!("Crawl aborted in state {:?}: {}", self.state, e);
        if e.is_fatal() {
            report.fatal = Some(e);
        } else {
            report.errors += 1;
        }
        self.close_browser().await;
        self.state = CrawlState::Done;
        report.state = self.state;
        report
    }

    async fn close_browser(&mut self) {
        info!("Closing browser");
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser: {}", e);
        }
    }
}

/// A finished run together with what was persisted for it.
#[derive(Debug)]
pub struct CrawlRun {
    pub report: CrawlReport,
    pub output_path: Option<PathBuf>,
    pub metrics: MetricsRecord,
}

/// Write the output table and the metrics record for a finished crawl.
/// Persistence failures are logged and counted, never returned.
pub fn persist_run(config: &CrawlConfig, mut report: CrawlReport, metrics: &RunMetrics) -> CrawlRun {
    info!("Saving the data");
    let output_path = match write_table(
        &report.table,
        &config.data_dir,
        &config.output_prefix,
        metrics.started().date_naive(),
    ) {
        Ok(path) => path,
        Err(e) => {
            error!("Failed to save category table: {}", e);
            report.errors += 1;
            None
        }
    };

    let mut record = metrics.finish(report.table.len(), report.total_errors(), report.reached_depth);

    info!("Saving run metrics");
    let stored = MetricsStore::new(&config.metrics_db)
        .and_then(|store| store.append(&config.metrics_sheet, &record));
    if let Err(e) = stored {
        error!(
            "Failed to save run metrics to {}: {}",
            config.metrics_db.display(),
            e
        );
        report.errors += 1;
        record.errors += 1;
    }

    CrawlRun {
        report,
        output_path,
        metrics: record,
    }
}

/// Execute a crawl against the live storefront with the given configuration
pub async fn execute_crawl(
    config: &CrawlConfig,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlRun> {
    let metrics = RunMetrics::start();
    config.validate()?;

    // Set up single progress spinner for the whole run (only if enabled)
    let progress_bar = if config.show_progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_message("Starting crawl...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let pb_for_callback = progress_bar.clone();
    let callback: CrawlProgressCallback = Arc::new(move |message: String| {
        if let Some(ref pb) = pb_for_callback {
            pb.set_message(message.clone());
        }
        if let Some(ref cb) = progress_callback {
            cb(message);
        }
    });

    let facets: Arc<dyn FacetSource> = Arc::new(FacetClient::new(&config.facet_api)?);

    info!("Launching browser");
    let mut browser = ChromiumSession::launch(config.launch.clone())
        .await
        .map_err(|e| ScanError::BrowserUnavailable(format!("{:#}", e)))?;

    let report = CrawlOrchestrator::new(config, &mut browser, facets)
        .with_progress(callback)
        .run()
        .await?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!(
            "Crawl complete: {} rows, depth {}",
            report.table.len(),
            report.reached_depth
        ));
    }

    Ok(persist_run(config, report, &metrics))
}
