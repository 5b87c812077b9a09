//! Resolves subcategory links to their root category by climbing the
//! breadcrumb of each subcategory page, memoizing results in the link cache.

use crate::browser::{BrowserSession, Locator, click_first};
use crate::cache::LinkCache;
use crate::error::{Result, ScanError};
use crate::menu::is_category_url;
use crate::node::RootCategory;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Modal shown on the first category page of a session.
    pub modal_close: Locator,
    pub parent_breadcrumb: Locator,
    pub root_heading: Locator,
    pub category_marker: String,
    /// Roots with this name are cached but never crawled.
    pub catch_all_label: String,
    pub wait_timeout: Duration,
    pub modal_timeout: Duration,
    /// Upper bound on breadcrumb clicks for a single link.
    pub max_climb: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            modal_close: Locator::css("#testId-modal-close"),
            parent_breadcrumb: Locator::css("a.l1category"),
            root_heading: Locator::css("h1.l2category"),
            category_marker: "category".to_string(),
            catch_all_label: "Especiales".to_string(),
            wait_timeout: Duration::from_secs(7),
            modal_timeout: Duration::from_secs(2),
            max_climb: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Root {
        name: String,
        link: String,
        cached: bool,
    },
    /// The link belongs to the catch-all root.
    CatchAll {
        name: String,
        link: String,
        cached: bool,
    },
}

impl Resolution {
    pub fn is_cached(&self) -> bool {
        match self {
            Resolution::Root { cached, .. } | Resolution::CatchAll { cached, .. } => *cached,
        }
    }
}

/// Roots of one crawl, deduplicated by id and sorted by id. When `fatal` is
/// set, resolution stopped early and `roots` holds what was resolved before.
#[derive(Debug, Default)]
pub struct RootSet {
    pub roots: Vec<RootCategory>,
    pub cache_hits: usize,
    pub resolved: usize,
    pub redirected: usize,
    pub excluded: usize,
    pub errors: usize,
    pub fatal: Option<ScanError>,
}

pub struct RootResolver<'a, B: BrowserSession + ?Sized> {
    browser: &'a mut B,
    options: &'a ResolverOptions,
    modal_dismissed: bool,
}

impl<'a, B: BrowserSession + ?Sized> RootResolver<'a, B> {
    pub fn new(browser: &'a mut B, options: &'a ResolverOptions) -> Self {
        Self {
            browser,
            options,
            modal_dismissed: false,
        }
    }

    /// Resolve one subcategory link. Cached links are answered without touching
    /// the browser; fresh resolutions are recorded into `cache`.
    pub async fn resolve(&mut self, link: &str, cache: &mut LinkCache) -> Result<Resolution> {
        if let Some((name, canonical)) = cache.lookup(link) {
            debug!("Link cache hit for {}", link);
            return Ok(self.classify(name.to_string(), canonical.to_string(), true));
        }

        self.browser.navigate(link).await?;
        if !self.modal_dismissed {
            self.modal_dismissed = true;
            match click_first(&mut *self.browser, &self.options.modal_close, self.options.modal_timeout)
                .await
            {
                Ok(()) => debug!("Dismissed category modal"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => {}
            }
        }

        let reached = self.browser.current_url().await?;
        if !is_category_url(&reached, &self.options.category_marker) {
            return Err(ScanError::RedirectAnomaly {
                requested: link.to_string(),
                reached,
            });
        }

        self.climb(link).await?;

        let canonical = self.browser.current_url().await?;
        let headings = self
            .browser
            .wait_until(&self.options.root_heading, self.options.wait_timeout)
            .await?;
        let name = match headings.first() {
            Some(heading) => self.browser.read_text(heading).await?.trim().to_string(),
            None => String::new(),
        };
        if name.is_empty() {
            return Err(ScanError::NotInteractable(format!(
                "empty root heading at {}",
                canonical
            )));
        }

        cache.record(link, &name, &canonical);
        info!("Category obtained: {}", name);
        Ok(self.classify(name, canonical, false))
    }

    /// Follow the parent breadcrumb until it can no longer be clicked.
    async fn climb(&mut self, link: &str) -> Result<()> {
        for _ in 0..self.options.max_climb {
            match click_first(
                &mut *self.browser,
                &self.options.parent_breadcrumb,
                self.options.wait_timeout,
            )
            .await
            {
                Ok(()) => continue,
                Err(ScanError::NotInteractable(_)) | Err(ScanError::NavigationTimeout { .. }) => {
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
        warn!(
            "Breadcrumb of {} still clickable after {} climbs, treating current page as root",
            link, self.options.max_climb
        );
        Ok(())
    }

    fn classify(&self, name: String, link: String, cached: bool) -> Resolution {
        if name == self.options.catch_all_label {
            Resolution::CatchAll { name, link, cached }
        } else {
            Resolution::Root { name, link, cached }
        }
    }

    /// Resolve every link in order. Per-link failures are counted; a fatal
    /// collaborator error stops the loop and is returned in `RootSet::fatal`
    /// along with the roots resolved so far.
    pub async fn resolve_all(&mut self, links: &[String], cache: &mut LinkCache) -> RootSet {
        let mut set = RootSet::default();
        let mut roots: BTreeMap<String, RootCategory> = BTreeMap::new();

        for link in links {
            let resolution = match self.resolve(link, cache).await {
                Ok(resolution) => resolution,
                Err(e) if e.is_fatal() => {
                    error!("Root resolution stopped at {}: {}", link, e);
                    set.fatal = Some(e);
                    break;
                }
                Err(ScanError::RedirectAnomaly { requested, reached }) => {
                    info!(
                        "Not extracting categories from {}, it redirects to {}",
                        requested, reached
                    );
                    set.redirected += 1;
                    continue;
                }
                Err(e) => {
                    error!("Failed to resolve {}: {}", link, e);
                    set.errors += 1;
                    continue;
                }
            };

            if resolution.is_cached() {
                set.cache_hits += 1;
            } else {
                set.resolved += 1;
            }

            match resolution {
                Resolution::CatchAll { name, .. } => {
                    debug!("Excluding catch-all category {} reached from {}", name, link);
                    set.excluded += 1;
                }
                Resolution::Root { name, link: canonical, .. } => {
                    match RootCategory::from_link(&name, &canonical) {
                        Some(root) => {
                            roots.entry(root.id.clone()).or_insert(root);
                        }
                        None => {
                            warn!("No category id in canonical link {}", canonical);
                            set.errors += 1;
                        }
                    }
                }
            }
        }

        set.roots = roots.into_values().collect();
        info!(
            "{} root categories ({} from cache, {} resolved, {} redirected, {} excluded, {} errors)",
            set.roots.len(),
            set.cache_hits,
            set.resolved,
            set.redirected,
            set.excluded,
            set.errors
        );
        set
    }
}
