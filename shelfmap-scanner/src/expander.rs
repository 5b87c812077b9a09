use crate::error::{Result, ScanError};
use crate::facets::{DEFAULT_CATEGORY_LABEL, DEFAULT_FACET_WINDOW, FacetSource};
use crate::node::{ChildNode, LevelNode};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ExpanderOptions {
    pub category_label: String,
    pub facet_window: usize,
    /// Maximum facet calls in flight.
    pub workers: usize,
}

impl Default for ExpanderOptions {
    fn default() -> Self {
        Self {
            category_label: DEFAULT_CATEGORY_LABEL.to_string(),
            facet_window: DEFAULT_FACET_WINDOW,
            workers: 10,
        }
    }
}

/// Every node id met so far in a run, at any depth.
#[derive(Debug, Clone, Default)]
pub struct SeenIdSet {
    ids: HashSet<String>,
}

impl SeenIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct LevelReport {
    /// Children not seen before, in input node order.
    pub children: Vec<ChildNode>,
    pub requested: usize,
    pub failures: usize,
    pub transport_failures: usize,
    pub duplicates_dropped: usize,
}

pub struct LevelExpander {
    source: Arc<dyn FacetSource>,
    options: ExpanderOptions,
}

impl LevelExpander {
    pub fn new(source: Arc<dyn FacetSource>, options: ExpanderOptions) -> Self {
        Self { source, options }
    }

    /// Fetch the children of every node in `nodes` and drop those already in
    /// `seen`. `seen` is only updated once every lookup of the level is done,
    /// in input node order, so the outcome does not depend on completion order.
    pub async fn expand(&self, nodes: &[LevelNode], seen: &mut SeenIdSet) -> Result<LevelReport> {
        let mut report = LevelReport {
            requested: nodes.len(),
            ..LevelReport::default()
        };
        if nodes.is_empty() {
            return Ok(report);
        }

        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut tasks = Vec::with_capacity(nodes.len());

        for (index, node) in nodes.iter().cloned().enumerate() {
            let source = self.source.clone();
            let semaphore = semaphore.clone();
            let label = self.options.category_label.clone();
            let window = self.options.facet_window;

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ScanError::Other(format!("worker pool closed: {}", e)))?;
                let response = source.fetch_facets(&node).await?;
                let children = response.category_children(&node.id, &label, window)?;
                debug!("{} children under {} ({})", children.len(), node.name, node.id);
                Ok::<_, ScanError>((index, children))
            }));
        }

        let mut collected = Vec::with_capacity(tasks.len());
        for (node, task) in nodes.iter().zip(tasks) {
            match task.await? {
                Ok(found) => collected.push(found),
                Err(e) => {
                    if e.is_transport() {
                        report.transport_failures += 1;
                    }
                    report.failures += 1;
                    warn!("No children for {} ({}): {}", node.name, node.id, e);
                }
            }
        }

        if report.transport_failures == report.requested {
            return Err(ScanError::ApiUnavailable(format!(
                "all {} facet lookups failed",
                report.requested
            )));
        }

        // Tasks complete in any order; aggregate in input order.
        collected.sort_by_key(|(index, _)| *index);

        // An id already seen at an earlier depth, or under an earlier parent of
        // this level, is dropped.
        for child in collected.into_iter().flat_map(|(_, children)| children) {
            if seen.insert(child.id.clone()) {
                report.children.push(child);
            } else {
                report.duplicates_dropped += 1;
            }
        }

        info!(
            "Level expanded: {} nodes, {} new children, {} failures, {} duplicates dropped",
            report.requested,
            report.children.len(),
            report.failures,
            report.duplicates_dropped
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facets::FacetResponse;
    use crate::testing::StaticFacetSource;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers after a per-id delay and tracks how many lookups overlap.
    struct DelayedFacetSource {
        inner: StaticFacetSource,
        delays: HashMap<String, Duration>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl DelayedFacetSource {
        fn new(inner: StaticFacetSource, delays: &[(&str, u64)]) -> Self {
            Self {
                inner,
                delays: delays
                    .iter()
                    .map(|(id, ms)| (id.to_string(), Duration::from_millis(*ms)))
                    .collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FacetSource for DelayedFacetSource {
        async fn fetch_facets(&self, node: &LevelNode) -> Result<FacetResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(&node.id) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.fetch_facets(node).await
        }
    }

    fn level(ids: &[&str]) -> Vec<LevelNode> {
        ids.iter()
            .map(|id| LevelNode {
                id: id.to_string(),
                name: format!("name-{}", id),
                path: String::new(),
            })
            .collect()
    }

    fn expander(source: StaticFacetSource, workers: usize) -> LevelExpander {
        LevelExpander::new(
            Arc::new(source),
            ExpanderOptions {
                category_label: "Category".to_string(),
                workers,
                ..ExpanderOptions::default()
            },
        )
    }

    #[tokio::test]
    async fn test_children_keep_input_order() {
        let source = StaticFacetSource::new()
            .children("1", "Category", &[("11", "A"), ("12", "B")])
            .children("2", "Category", &[("21", "C")])
            .children("3", "Category", &[("31", "D")]);
        let mut seen = SeenIdSet::new();

        let report = expander(source, 3)
            .expand(&level(&["1", "2", "3"]), &mut seen)
            .await
            .unwrap();

        let ids: Vec<_> = report.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["11", "12", "21", "31"]);
        assert_eq!(report.children[2].parent_id, "2");
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn test_out_of_order_completion_keeps_input_order() {
        let inner = StaticFacetSource::new()
            .children("1", "Category", &[("11", "A"), ("99", "Shared")])
            .children("2", "Category", &[("21", "B")])
            .children("3", "Category", &[("31", "C"), ("99", "Shared")]);
        let source = Arc::new(DelayedFacetSource::new(
            inner,
            &[("1", 120), ("2", 60), ("3", 0)],
        ));
        let expander = LevelExpander::new(
            source.clone(),
            ExpanderOptions {
                category_label: "Category".to_string(),
                workers: 3,
                ..ExpanderOptions::default()
            },
        );
        let mut seen = SeenIdSet::new();

        let report = expander
            .expand(&level(&["1", "2", "3"]), &mut seen)
            .await
            .unwrap();

        // The last node answered first.
        assert_eq!(source.inner.requested(), vec!["3", "2", "1"]);

        let ids: Vec<_> = report.children.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["11", "99", "21", "31"]);
        assert_eq!(report.children[1].parent_id, "1");
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(seen.len(), 4);
        assert!(seen.contains("99"));
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_calls_in_flight() {
        let ids = ["1", "2", "3", "4", "5", "6"];
        let delays: Vec<(&str, u64)> = ids.iter().map(|id| (*id, 20)).collect();
        let source = Arc::new(DelayedFacetSource::new(StaticFacetSource::new(), &delays));
        let expander = LevelExpander::new(
            source.clone(),
            ExpanderOptions {
                workers: 2,
                ..ExpanderOptions::default()
            },
        );
        let mut seen = SeenIdSet::new();

        let report = expander.expand(&level(&ids), &mut seen).await.unwrap();

        assert_eq!(report.requested, 6);
        assert_eq!(source.inner.calls(), 6);
        assert_eq!(source.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_child_under_two_parents_is_kept_once() {
        let source = StaticFacetSource::new()
            .children("1", "Category", &[("8", "Men")])
            .children("2", "Category", &[("8", "Men"), ("9", "Women")]);
        let mut seen = SeenIdSet::new();

        let report = expander(source, 2)
            .expand(&level(&["1", "2"]), &mut seen)
            .await
            .unwrap();

        let pairs: Vec<_> = report
            .children
            .iter()
            .map(|c| (c.parent_id.as_str(), c.id.as_str()))
            .collect();
        assert_eq!(pairs, vec![("1", "8"), ("2", "9")]);
        assert_eq!(report.duplicates_dropped, 1);
    }

    #[tokio::test]
    async fn test_seen_ids_are_dropped() {
        let source = StaticFacetSource::new()
            .children("1", "Category", &[("5", "Old"), ("6", "New")]);
        let mut seen = SeenIdSet::new();
        seen.insert("5");

        let report = expander(source, 2)
            .expand(&level(&["1"]), &mut seen)
            .await
            .unwrap();

        assert_eq!(report.children.len(), 1);
        assert_eq!(report.children[0].id, "6");
        assert_eq!(report.duplicates_dropped, 1);
        assert!(seen.contains("6"));
    }

    #[tokio::test]
    async fn test_failures_yield_no_children() {
        let source = StaticFacetSource::new()
            .children("1", "Category", &[("11", "A")])
            .failing("2")
            .respond("3", "not json");
        let mut seen = SeenIdSet::new();

        let report = expander(source, 1)
            .expand(&level(&["1", "2", "3"]), &mut seen)
            .await
            .unwrap();

        assert_eq!(report.children.len(), 1);
        assert_eq!(report.failures, 2);
        assert_eq!(report.transport_failures, 1);
    }

    #[tokio::test]
    async fn test_total_transport_failure_is_fatal() {
        let source = StaticFacetSource::new().fail_all();
        let mut seen = SeenIdSet::new();

        let err = expander(source, 4)
            .expand(&level(&["1", "2"]), &mut seen)
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::ApiUnavailable(_)));
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn test_empty_level_makes_no_calls() {
        let source = Arc::new(StaticFacetSource::new());
        let expander = LevelExpander::new(source.clone(), ExpanderOptions::default());
        let mut seen = SeenIdSet::new();

        let report = expander.expand(&[], &mut seen).await.unwrap();

        assert!(report.children.is_empty());
        assert_eq!(source.calls(), 0);
    }
}
