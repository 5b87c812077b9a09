use crate::browser::{BrowserSession, ElementRef, Locator, click_first};
use crate::error::{Result, ScanError};
use rayon::prelude::*;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct MenuOptions {
    pub home_url: String,
    pub menu_button: Locator,
    pub first_level: Locator,
    pub second_level_links: Locator,
    /// Overlays dismissed best-effort before the menu is opened.
    pub popups: Vec<Locator>,
    /// Trailing entry labels that mark seasonal or promotional categories.
    pub seasonal_labels: Vec<String>,
    /// Substring every category page URL contains.
    pub category_marker: String,
    pub wait_timeout: Duration,
    pub popup_timeout: Duration,
}

impl Default for MenuOptions {
    fn default() -> Self {
        Self {
            home_url: "https://www.falabella.com.pe/falabella-pe".to_string(),
            menu_button: Locator::css(".MarketplaceHamburgerBtn-module_hamburgerBtn__61t-r"),
            first_level: Locator::css("div.FirstLevelCategories-module_categories__x82VK"),
            second_level_links: Locator::css(
                "li.SecondLevelCategories-module_thirdLevelCategory__2ZQFF > a",
            ),
            popups: vec![
                Locator::css(".dy-lb-close"),
                Locator::css("#testId-accept-cookies-btn"),
                Locator::css(".airship-btn.airship-btn-deny"),
                Locator::css(".dy-lb-close"),
            ],
            seasonal_labels: vec![
                "NUEVO".to_string(),
                "Emprendedores".to_string(),
                "SALE".to_string(),
            ],
            category_marker: "category".to_string(),
            wait_timeout: Duration::from_secs(7),
            popup_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub links: HashSet<String>,
    pub errors: usize,
}

/// Whether a first-level menu entry is a permanent category. The entry's last
/// text line carries the seasonal badge, if any.
pub fn is_permanent_category(text: &str, seasonal_labels: &[String]) -> bool {
    let badge = text.split('\n').next_back().unwrap_or_default().trim();
    !seasonal_labels.iter().any(|label| label == badge)
}

/// Drops the query string. A bare trailing `?` is left alone.
pub fn strip_query(href: &str) -> &str {
    match href.find('?') {
        Some(i) if i + 1 < href.len() => &href[..i],
        _ => href,
    }
}

pub fn is_category_url(url: &str, marker: &str) -> bool {
    url.contains(marker)
}

/// Strip, deduplicate and keep category URLs. Pure, so it fans out freely.
pub fn normalize_links(hrefs: &[String], marker: &str) -> HashSet<String> {
    hrefs
        .par_iter()
        .map(|href| strip_query(href))
        .filter(|url| is_category_url(url, marker))
        .map(str::to_string)
        .collect()
}

pub struct MenuDiscovery<'a, B: BrowserSession + ?Sized> {
    browser: &'a mut B,
    options: &'a MenuOptions,
}

impl<'a, B: BrowserSession + ?Sized> MenuDiscovery<'a, B> {
    pub fn new(browser: &'a mut B, options: &'a MenuOptions) -> Self {
        Self { browser, options }
    }

    /// Enumerate subcategory links from the navigation menu. Only fatal
    /// collaborator failures are returned as errors; anything else is counted
    /// in the report.
    pub async fn discover(&mut self) -> Result<DiscoveryReport> {
        let mut report = DiscoveryReport::default();

        info!("Opening storefront home page {}", self.options.home_url);
        // The second load clears the interstitials shown on first visit.
        for _ in 0..2 {
            if let Err(e) = self.browser.navigate(&self.options.home_url).await {
                return absorb(e, &mut report);
            }
        }

        self.dismiss_popups().await?;

        info!("Opening navigation menu");
        if let Err(e) = click_first(
            &mut *self.browser,
            &self.options.menu_button,
            self.options.wait_timeout,
        )
        .await
        {
            return absorb(e, &mut report);
        }

        let entries = match self
            .browser
            .wait_until(&self.options.first_level, self.options.wait_timeout)
            .await
        {
            Ok(entries) => entries,
            Err(e) => return absorb(e, &mut report),
        };

        let mut labels = Vec::with_capacity(entries.len());
        for entry in &entries {
            let label = match self.browser.read_text(entry).await {
                Ok(label) => label,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!("Unreadable menu entry {}: {}", entry, e);
                    String::new()
                }
            };
            labels.push(label);
        }

        let seasonal = &self.options.seasonal_labels;
        let permanent: Vec<usize> = labels
            .par_iter()
            .enumerate()
            .filter(|(_, label)| is_permanent_category(label, seasonal))
            .map(|(i, _)| i)
            .collect();
        info!(
            "{} of {} first-level categories are permanent",
            permanent.len(),
            entries.len()
        );

        let mut hrefs = Vec::new();
        for i in permanent {
            let entry = &entries[i];
            match self.collect_submenu(entry).await {
                Ok(found) => {
                    debug!("{} links under {}", found.len(), labels[i].trim());
                    hrefs.extend(found);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(
                        "Failed to read subcategories of '{}': {}",
                        labels[i].trim(),
                        e
                    );
                    report.errors += 1;
                }
            }
        }

        report.links = normalize_links(&hrefs, &self.options.category_marker);
        info!(
            "Discovered {} distinct category links from {} menu links",
            report.links.len(),
            hrefs.len()
        );
        Ok(report)
    }

    async fn collect_submenu(&mut self, entry: &ElementRef) -> Result<Vec<String>> {
        self.browser.click(entry).await?;
        let links = self
            .browser
            .wait_until(&self.options.second_level_links, self.options.wait_timeout)
            .await?;

        let mut hrefs = Vec::with_capacity(links.len());
        for link in &links {
            if let Some(href) = self.browser.read_attribute(link, "href").await? {
                hrefs.push(href);
            }
        }
        Ok(hrefs)
    }

    async fn dismiss_popups(&mut self) -> Result<()> {
        for popup in &self.options.popups {
            match click_first(&mut *self.browser, popup, self.options.popup_timeout).await {
                Ok(()) => debug!("Dismissed popup {}", popup),
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => {}
            }
        }
        Ok(())
    }
}

fn absorb(e: ScanError, report: &mut DiscoveryReport) -> Result<DiscoveryReport> {
    if e.is_fatal() {
        return Err(e);
    }
    warn!("Menu discovery stopped early: {}", e);
    report.errors += 1;
    Ok(std::mem::take(report))
}
