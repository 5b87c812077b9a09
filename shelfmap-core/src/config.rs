use shelfmap_scanner::browser::chromium::LaunchOptions;
use shelfmap_scanner::error::{Result, ScanError};
use shelfmap_scanner::{ExpanderOptions, FacetApiOptions, MenuOptions, ResolverOptions};
use std::path::PathBuf;

pub const DEFAULT_MAX_DEPTH: i64 = 5;
pub const DEFAULT_CACHE_FILE: &str = "category_dictionary.csv";
pub const DEFAULT_DATA_DIR: &str = "Data";
pub const DEFAULT_OUTPUT_PREFIX: &str = "falabella_category";
pub const DEFAULT_METRICS_DB: &str = "metadata.db";
pub const DEFAULT_METRICS_SHEET: &str = "Categorias";

/// Everything one crawl run needs. `Default` carries the storefront constants.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Levels to materialize, counting the root level.
    pub max_depth: i64,
    pub menu: MenuOptions,
    pub resolver: ResolverOptions,
    pub facet_api: FacetApiOptions,
    pub expander: ExpanderOptions,
    pub launch: LaunchOptions,
    pub cache_path: PathBuf,
    pub data_dir: PathBuf,
    pub output_prefix: String,
    pub metrics_db: PathBuf,
    pub metrics_sheet: String,
    pub log_dir: Option<PathBuf>,
    pub show_progress: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            menu: MenuOptions::default(),
            resolver: ResolverOptions::default(),
            facet_api: FacetApiOptions::default(),
            expander: ExpanderOptions::default(),
            launch: LaunchOptions::default(),
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            metrics_db: PathBuf::from(DEFAULT_METRICS_DB),
            metrics_sheet: DEFAULT_METRICS_SHEET.to_string(),
            log_dir: None,
            show_progress: true,
        }
    }
}

impl CrawlConfig {
    /// Reject configurations a run cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth <= 0 {
            return Err(ScanError::Configuration(format!(
                "max depth must be at least 1, got {}",
                self.max_depth
            )));
        }
        if self.expander.workers == 0 {
            return Err(ScanError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }

        let required = [
            ("home URL", self.menu.home_url.as_str()),
            ("facet endpoint", self.facet_api.endpoint.as_str()),
            ("category facet label", self.expander.category_label.as_str()),
            ("output prefix", self.output_prefix.as_str()),
            ("metrics sheet", self.metrics_sheet.as_str()),
        ];
        for (what, value) in required {
            if value.trim().is_empty() {
                return Err(ScanError::Configuration(format!("{} is empty", what)));
            }
        }

        let paths = [
            ("cache path", &self.cache_path),
            ("data directory", &self.data_dir),
            ("metrics database", &self.metrics_db),
        ];
        for (what, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(ScanError::Configuration(format!("{} is empty", what)));
            }
        }
        Ok(())
    }

    /// Expansion levels after the roots.
    pub fn expansion_levels(&self) -> usize {
        self.max_depth.saturating_sub(1).max(0) as usize
    }
}
