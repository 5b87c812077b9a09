//! Browser capability used by menu discovery and root resolution.
//!
//! A session is a single stateful resource: callers hold it by `&mut` and never
//! drive it from two tasks at once.

pub mod chromium;

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// A CSS selector identifying zero or more elements on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `index`-th match of `locator` at the time it was looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub locator: Locator,
    pub index: usize,
}

impl ElementRef {
    pub fn new(locator: &Locator, index: usize) -> Self {
        Self {
            locator: locator.clone(),
            index,
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.locator, self.index)
    }
}

#[async_trait]
pub trait BrowserSession: Send {
    /// Load `url` in the session's page.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Wait until at least one element matches, failing with
    /// [`ScanError::NavigationTimeout`] once `timeout` elapses.
    async fn wait_until(&mut self, locator: &Locator, timeout: Duration)
    -> Result<Vec<ElementRef>>;

    /// Click an element. Fails with [`ScanError::NotInteractable`] when it is
    /// gone or cannot receive the click.
    async fn click(&mut self, element: &ElementRef) -> Result<()>;

    async fn read_text(&mut self, element: &ElementRef) -> Result<String>;

    async fn read_attribute(&mut self, element: &ElementRef, name: &str)
    -> Result<Option<String>>;

    async fn current_url(&mut self) -> Result<String>;

    /// Release the underlying browser. Further calls may fail.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Wait for `locator` and click its first match.
pub async fn click_first<B>(browser: &mut B, locator: &Locator, timeout: Duration) -> Result<()>
where
    B: BrowserSession + ?Sized,
{
    let elements = browser.wait_until(locator, timeout).await?;
    match elements.first() {
        Some(element) => browser.click(element).await,
        None => Err(ScanError::NotInteractable(locator.to_string())),
    }
}
