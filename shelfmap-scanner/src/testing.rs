//! In-memory collaborators for tests: a scripted storefront the menu and
//! resolver can be driven against, and a facet source backed by canned JSON.

use crate::browser::{BrowserSession, ElementRef, Locator};
use crate::error::{Result, ScanError};
use crate::facets::{FacetResponse, FacetSource};
use crate::node::LevelNode;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum ClickAction {
    Nothing,
    Navigate(String),
    /// Show `elements` under `locator` on the current page, replacing whatever a
    /// previous reveal showed there.
    Reveal {
        locator: Locator,
        elements: Vec<ScriptedElement>,
    },
    /// The element is present but refuses clicks.
    Refuse,
}

#[derive(Debug, Clone)]
pub struct ScriptedElement {
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub action: ClickAction,
}

impl ScriptedElement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attributes: HashMap::new(),
            action: ClickAction::Nothing,
        }
    }

    /// An anchor whose `href` is `href`; clicking it navigates there.
    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        let href = href.into();
        Self::new(text)
            .attr("href", href.clone())
            .on_click(ClickAction::Navigate(href))
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn on_click(mut self, action: ClickAction) -> Self {
        self.action = action;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    elements: HashMap<Locator, Vec<ScriptedElement>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, locator: &Locator, element: ScriptedElement) -> Self {
        self.elements
            .entry(locator.clone())
            .or_default()
            .push(element);
        self
    }
}

/// A fake storefront. Unknown URLs load as empty pages; `redirect` makes a URL
/// land somewhere else.
#[derive(Debug, Default)]
pub struct ScriptedBrowser {
    pages: HashMap<String, ScriptedPage>,
    redirects: HashMap<String, String>,
    current: Option<String>,
    revealed: HashMap<Locator, Vec<ScriptedElement>>,
    navigations: Vec<String>,
    clicks: usize,
    unavailable_after: Option<usize>,
    lost_on_read: bool,
    closed: bool,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: impl Into<String>, page: ScriptedPage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    pub fn redirect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.redirects.insert(from.into(), to.into());
        self
    }

    /// Every navigation after the first `n` fails as if the browser died.
    pub fn unavailable_after(mut self, n: usize) -> Self {
        self.unavailable_after = Some(n);
        self
    }

    /// Every text read fails as if the browser died.
    pub fn lost_on_read(mut self) -> Self {
        self.lost_on_read = true;
        self
    }

    /// Every URL requested through `navigate`, in order.
    pub fn navigations(&self) -> &[String] {
        &self.navigations
    }

    pub fn navigation_count(&self) -> usize {
        self.navigations.len()
    }

    pub fn clicks(&self) -> usize {
        self.clicks
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn load(&mut self, url: &str) {
        let landed = self
            .redirects
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string());
        self.current = Some(landed);
        self.revealed.clear();
    }

    fn visible(&self, locator: &Locator) -> Vec<ScriptedElement> {
        let mut found = self
            .current
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .and_then(|page| page.elements.get(locator))
            .cloned()
            .unwrap_or_default();
        if let Some(revealed) = self.revealed.get(locator) {
            found.extend(revealed.iter().cloned());
        }
        found
    }

    fn element(&self, element: &ElementRef) -> Result<ScriptedElement> {
        self.visible(&element.locator)
            .into_iter()
            .nth(element.index)
            .ok_or_else(|| ScanError::NotInteractable(format!("{} vanished", element)))
    }
}

#[async_trait]
impl BrowserSession for ScriptedBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        if self.closed {
            return Err(ScanError::BrowserUnavailable("session closed".to_string()));
        }
        if let Some(limit) = self.unavailable_after
            && self.navigations.len() >= limit
        {
            return Err(ScanError::BrowserUnavailable(format!(
                "browser lost while loading {}",
                url
            )));
        }
        self.navigations.push(url.to_string());
        self.load(url);
        Ok(())
    }

    async fn wait_until(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Vec<ElementRef>> {
        let count = self.visible(locator).len();
        if count == 0 {
            return Err(ScanError::NavigationTimeout {
                locator: locator.to_string(),
                timeout,
            });
        }
        Ok((0..count).map(|i| ElementRef::new(locator, i)).collect())
    }

    async fn click(&mut self, element: &ElementRef) -> Result<()> {
        let target = self.element(element)?;
        self.clicks += 1;
        match target.action {
            ClickAction::Nothing => {}
            ClickAction::Navigate(url) => self.load(&url),
            ClickAction::Reveal { locator, elements } => {
                self.revealed.insert(locator, elements);
            }
            ClickAction::Refuse => {
                return Err(ScanError::NotInteractable(element.to_string()));
            }
        }
        Ok(())
    }

    async fn read_text(&mut self, element: &ElementRef) -> Result<String> {
        if self.lost_on_read {
            return Err(ScanError::BrowserUnavailable(format!(
                "browser lost while reading {}",
                element
            )));
        }
        Ok(self.element(element)?.text)
    }

    async fn read_attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>> {
        Ok(self.element(element)?.attributes.get(name).cloned())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.current.clone().unwrap_or_default())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Canned facet responses keyed by node id. Ids without a response answer
/// with an empty facet list; ids marked as failing answer with a transport
/// error.
#[derive(Debug, Default)]
pub struct StaticFacetSource {
    responses: HashMap<String, String>,
    failing: Vec<String>,
    fail_all: bool,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl StaticFacetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON body returned for `id`.
    pub fn respond(mut self, id: impl Into<String>, body: impl Into<String>) -> Self {
        self.responses.insert(id.into(), body.into());
        self
    }

    /// A well-formed response whose only facet is a category facet named
    /// `label` holding `(id, title)` children.
    pub fn children(self, id: &str, label: &str, children: &[(&str, &str)]) -> Self {
        let values: Vec<serde_json::Value> = children
            .iter()
            .map(|(child_id, title)| {
                serde_json::json!({
                    "id": child_id,
                    "title": title,
                    "url": format!("f.derived.variant.categoryId={}", child_id),
                })
            })
            .collect();
        let body = serde_json::json!({
            "data": { "facets": [ { "name": label, "values": values } ] }
        });
        self.respond(id, body.to_string())
    }

    pub fn failing(mut self, id: impl Into<String>) -> Self {
        self.failing.push(id.into());
        self
    }

    pub fn fail_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Ids requested so far, in call order.
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FacetSource for StaticFacetSource {
    async fn fetch_facets(&self, node: &LevelNode) -> Result<FacetResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut ids) = self.requested.lock() {
            ids.push(node.id.clone());
        }

        if self.fail_all || self.failing.contains(&node.id) {
            return Err(ScanError::UnexpectedStatus {
                url: format!("static://{}", node.id),
                status: 503,
            });
        }

        let body = self
            .responses
            .get(&node.id)
            .map(String::as_str)
            .unwrap_or(r#"{"data":{"facets":[]}}"#);
        FacetResponse::from_json(body)
    }
}
