pub mod browser;
pub mod cache;
pub mod error;
pub mod expander;
pub mod facets;
pub mod menu;
pub mod node;
pub mod resolver;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use browser::{BrowserSession, ElementRef, Locator};
pub use browser::chromium::{ChromiumSession, LaunchOptions};
pub use cache::{LinkCache, LinkCacheEntry};
pub use error::ScanError;
pub use expander::{ExpanderOptions, LevelExpander, LevelReport, SeenIdSet};
pub use facets::{FacetApiOptions, FacetClient, FacetResponse, FacetSource};
pub use menu::{DiscoveryReport, MenuDiscovery, MenuOptions};
pub use node::{CategoryNode, ChildNode, LevelNode, RootCategory};
pub use resolver::{Resolution, ResolverOptions, RootResolver, RootSet};
