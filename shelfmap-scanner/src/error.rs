use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    /// An element or page was not ready within the wait budget.
    #[error("Timed out after {timeout:?} waiting for {locator}")]
    NavigationTimeout { locator: String, timeout: Duration },

    /// The element vanished or cannot receive clicks. Also the success signal of a
    /// breadcrumb climb.
    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Redirected away from category page: {requested} -> {reached}")]
    RedirectAnomaly { requested: String, reached: String },

    #[error("Facet parse error: {0}")]
    FacetParse(String),

    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Persistence error for {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Facet API unavailable: {0}")]
    ApiUnavailable(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

impl ScanError {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ScanError::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that end the run. Everything else is absorbed at node/link scope.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::Configuration(_)
                | ScanError::BrowserUnavailable(_)
                | ScanError::ApiUnavailable(_)
        )
    }

    /// Failures of the remote call itself, as opposed to a bad payload.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ScanError::HttpError(_) | ScanError::UnexpectedStatus { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ScanError::Configuration("depth".into()).is_fatal());
        assert!(ScanError::BrowserUnavailable("gone".into()).is_fatal());
        assert!(ScanError::ApiUnavailable("gone".into()).is_fatal());
        assert!(!ScanError::FacetParse("bad".into()).is_fatal());
        assert!(!ScanError::NotInteractable("crumb".into()).is_fatal());
        assert!(
            !ScanError::NavigationTimeout {
                locator: "a".into(),
                timeout: Duration::from_secs(1)
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_persistence_message_names_path() {
        let err = ScanError::persistence("/nope/cache.csv", "read-only");
        assert_eq!(
            err.to_string(),
            "Persistence error for /nope/cache.csv: read-only"
        );
    }
}
