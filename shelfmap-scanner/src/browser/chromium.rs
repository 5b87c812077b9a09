//! Chromium-backed browser session using chromiumoxide.

use super::{BrowserSession, ElementRef, Locator};
use crate::error::{Result, ScanError};
use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Environment variable that overrides Chromium auto-detection.
pub const CHROMIUM_PATH_ENV: &str = "SHELFMAP_CHROMIUM_PATH";

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub navigation_timeout: Duration,
    pub poll_interval: Duration,
    /// How long a click waits for the navigation it may have started.
    pub settle_timeout: Duration,
    pub window_size: (u32, u32),
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            navigation_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
            settle_timeout: Duration::from_secs(3),
            window_size: (1920, 1080),
        }
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    options: LaunchOptions,
}

impl ChromiumSession {
    /// Launch Chromium and open the single page this session drives.
    pub async fn launch(options: LaunchOptions) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(options.window_size.0, options.window_size.1)
            .request_timeout(options.navigation_timeout)
            .arg("--disable-notifications")
            .arg("--disable-popup-blocking")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox");

        if !options.headless {
            builder = builder.with_head();
        }

        if let Ok(path) = std::env::var(CHROMIUM_PATH_ENV) {
            builder = builder.chrome_executable(PathBuf::from(path));
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Chromium handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open browser page")?;

        Ok(Self {
            browser,
            page,
            handler,
            options,
        })
    }

    async fn find(&self, locator: &Locator) -> Vec<Element> {
        // chromiumoxide reports "no match" as an error; both mean nothing to act on.
        self.page
            .find_elements(locator.as_str())
            .await
            .unwrap_or_default()
    }

    async fn resolve(&self, element: &ElementRef) -> Result<Element> {
        self.find(&element.locator)
            .await
            .into_iter()
            .nth(element.index)
            .ok_or_else(|| ScanError::NotInteractable(format!("{} vanished", element)))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let timeout = self.options.navigation_timeout;
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ScanError::BrowserUnavailable(format!(
                "navigation to {} failed: {}",
                url, e
            ))),
            Err(_) => Err(ScanError::NavigationTimeout {
                locator: url.to_string(),
                timeout,
            }),
        }
    }

    async fn wait_until(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Vec<ElementRef>> {
        let start = Instant::now();
        loop {
            let found = self.find(locator).await;
            if !found.is_empty() {
                return Ok((0..found.len()).map(|i| ElementRef::new(locator, i)).collect());
            }
            if start.elapsed() >= timeout {
                return Err(ScanError::NavigationTimeout {
                    locator: locator.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    async fn click(&mut self, element: &ElementRef) -> Result<()> {
        let target = self.resolve(element).await?;
        target
            .scroll_into_view()
            .await
            .map_err(|e| ScanError::NotInteractable(format!("{}: {}", element, e)))?;
        target
            .click()
            .await
            .map_err(|e| ScanError::NotInteractable(format!("{}: {}", element, e)))?;

        // A click on a link starts a navigation; give it a bounded chance to land.
        let _ = tokio::time::timeout(self.options.settle_timeout, self.page.wait_for_navigation())
            .await;
        Ok(())
    }

    async fn read_text(&mut self, element: &ElementRef) -> Result<String> {
        let target = self.resolve(element).await?;
        let text = target
            .inner_text()
            .await
            .map_err(|e| ScanError::NotInteractable(format!("{}: {}", element, e)))?;
        Ok(text.unwrap_or_default())
    }

    async fn read_attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>> {
        let target = self.resolve(element).await?;
        target
            .attribute(name)
            .await
            .map_err(|e| ScanError::NotInteractable(format!("{}: {}", element, e)))
    }

    async fn current_url(&mut self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| ScanError::BrowserUnavailable(format!("failed to read URL: {}", e)))?;
        Ok(url.unwrap_or_default())
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close Chromium cleanly: {}", e);
        }
        self.handler.abort();
        Ok(())
    }
}
