use serde::{Deserialize, Serialize};
use url::Url;

/// A node of the category tree at a given depth. Identity is `(id, depth)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
    pub path_or_link: String,
    pub depth: usize,
}

/// A depth-0 category as resolved from the storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCategory {
    pub id: String,
    pub name: String,
    pub link: String,
}

impl RootCategory {
    /// Builds a root from its canonical link. Returns `None` when no id can be
    /// derived from the link.
    pub fn from_link(name: &str, link: &str) -> Option<Self> {
        let id = category_id_from_link(link)?;
        Some(Self {
            id,
            name: name.to_string(),
            link: link.to_string(),
        })
    }

    pub fn into_node(self) -> CategoryNode {
        CategoryNode {
            id: self.id,
            name: self.name,
            // Roots are queried against the API without a facet path.
            path_or_link: String::new(),
            depth: 0,
        }
    }
}

/// The `(id, name, path)` triple a facet lookup is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LevelNode {
    pub id: String,
    pub name: String,
    pub path: String,
}

impl From<&CategoryNode> for LevelNode {
    fn from(node: &CategoryNode) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            path: node.path_or_link.clone(),
        }
    }
}

/// One value of a category facet, attached to the node it was fetched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildNode {
    pub parent_id: String,
    pub id: String,
    pub title: String,
    pub path: String,
}

impl ChildNode {
    pub fn into_node(self, depth: usize) -> CategoryNode {
        CategoryNode {
            id: self.id,
            name: self.title,
            path_or_link: self.path,
            depth,
        }
    }
}

/// Extracts the category id from a canonical link: the path segment right
/// before the last one (`/falabella-pe/category/cat40712/Moda-Mujer` -> `cat40712`).
pub fn category_id_from_link(link: &str) -> Option<String> {
    let path = match Url::parse(link) {
        Ok(url) => url.path().to_string(),
        Err(_) => link.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 3 {
        return None;
    }

    let id = segments[segments.len() - 2];
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_id_from_canonical_link() {
        assert_eq!(
            category_id_from_link(
                "https://www.falabella.com.pe/falabella-pe/category/cat40712/Moda-Mujer"
            ),
            Some("cat40712".to_string())
        );
    }

    #[test]
    fn test_category_id_ignores_query() {
        assert_eq!(
            category_id_from_link("https://shop.example/category/cat1/Shoes?page=2"),
            Some("cat1".to_string())
        );
    }

    #[test]
    fn test_category_id_missing() {
        assert_eq!(category_id_from_link("https://shop.example/"), None);
        assert_eq!(category_id_from_link("https://shop.example/Shoes"), None);
    }

    #[test]
    fn test_root_into_node_has_empty_path() {
        let root = RootCategory::from_link("Shoes", "https://shop.example/category/c7/Shoes")
            .unwrap();
        let node = root.into_node();
        assert_eq!(node.id, "c7");
        assert_eq!(node.depth, 0);
        assert!(node.path_or_link.is_empty());
    }
}
