//! The wide category table: one row per root-to-leaf branch, one
//! `Id_i, Name_i, Path_i` column group per depth.

use shelfmap_scanner::{CategoryNode, ChildNode, LevelNode, RootCategory};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WideCategoryTable {
    depths: usize,
    rows: Vec<Vec<Option<CategoryNode>>>,
}

impl WideCategoryTable {
    /// One row per root, depth 0 only. Root paths are empty.
    pub fn from_roots(roots: &[RootCategory]) -> Self {
        let rows = roots
            .iter()
            .map(|root| vec![Some(root.clone().into_node())])
            .collect();
        Self { depths: 1, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of column groups.
    pub fn depths(&self) -> usize {
        self.depths
    }

    pub fn rows(&self) -> &[Vec<Option<CategoryNode>>] {
        &self.rows
    }

    pub fn cell(&self, row: usize, depth: usize) -> Option<&CategoryNode> {
        self.rows.get(row)?.get(depth)?.as_ref()
    }

    pub fn header(&self) -> Vec<String> {
        (0..self.depths)
            .flat_map(|depth| {
                [
                    format!("Id_{}", depth),
                    format!("Name_{}", depth),
                    format!("Path_{}", depth),
                ]
            })
            .collect()
    }

    /// Distinct nodes populated at `depth`, in row order.
    pub fn frontier(&self, depth: usize) -> Vec<LevelNode> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter_map(|row| row.get(depth)?.as_ref())
            .filter(|cell| seen.insert(cell.id.clone()))
            .map(LevelNode::from)
            .collect()
    }

    /// Left-join `children` onto the rows by their depth `depth - 1` id, adding
    /// the depth `depth` column group. Children are deduplicated by id first,
    /// keeping the first. Parents with several children fan out into one row
    /// per child; rows without a match keep a null cell. Returns how many rows
    /// gained a child.
    pub fn merge(&mut self, children: &[ChildNode], depth: usize) -> usize {
        if depth == 0 || depth != self.depths {
            debug!(
                "Ignoring merge at depth {} into a table with {} depths",
                depth, self.depths
            );
            return 0;
        }

        let mut unique = HashSet::new();
        let mut by_parent: HashMap<&str, Vec<&ChildNode>> = HashMap::new();
        for child in children {
            if unique.insert(child.id.as_str()) {
                by_parent
                    .entry(child.parent_id.as_str())
                    .or_default()
                    .push(child);
            }
        }

        let mut merged = Vec::with_capacity(self.rows.len());
        let mut matched = 0;
        for row in self.rows.drain(..) {
            let matches = row
                .get(depth - 1)
                .and_then(|cell| cell.as_ref())
                .and_then(|parent| by_parent.get(parent.id.as_str()));

            match matches {
                Some(children) => {
                    for child in children {
                        let mut expanded = row.clone();
                        expanded.push(Some((*child).clone().into_node(depth)));
                        merged.push(expanded);
                        matched += 1;
                    }
                }
                None => {
                    let mut kept = row;
                    kept.push(None);
                    merged.push(kept);
                }
            }
        }

        self.rows = merged;
        self.depths += 1;
        matched
    }
}
