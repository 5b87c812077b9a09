//! Listing-API facet lookups.
//!
//! Only `data.facets[] -> {name, values[] -> {id, title, url}}` is read, and
//! only for the category facet; any other field in the payload is ignored.

use crate::error::{Result, ScanError};
use crate::node::{ChildNode, LevelNode};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Label of the facet that enumerates a node's direct children.
pub const DEFAULT_CATEGORY_LABEL: &str = "Categoría";

/// How many leading facets are considered when looking for the category facet.
pub const DEFAULT_FACET_WINDOW: usize = 4;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacetResponse {
    pub data: Option<FacetData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacetData {
    /// Facets are kept as raw JSON; only the category facet picked inside the
    /// window is decoded, so malformed facets elsewhere cannot spoil a response.
    pub facets: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacetValue {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub url: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl FacetResponse {
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| ScanError::FacetParse(e.to_string()))
    }

    /// Children of `parent_id` listed by the category facet.
    ///
    /// Only the first `window` facets are inspected, scanning backwards: the
    /// API places the category facet near the end of that window. This is a
    /// positional heuristic and silently misses the facet if the API reorders
    /// its facets. A response without a category facet in the window has no
    /// children; a category facet with incomplete values is a parse error.
    pub fn category_children(
        &self,
        parent_id: &str,
        label: &str,
        window: usize,
    ) -> Result<Vec<ChildNode>> {
        let facets = self
            .data
            .as_ref()
            .ok_or_else(|| ScanError::FacetParse("missing `data`".to_string()))?
            .facets
            .as_ref()
            .ok_or_else(|| ScanError::FacetParse("missing `data.facets`".to_string()))?;

        let is_category =
            |facet: &&Value| facet.get("name").and_then(Value::as_str) == Some(label);

        let Some(facet) = facets.iter().take(window).rev().find(is_category) else {
            if facets.iter().skip(window).any(|f| is_category(&f)) {
                debug!(
                    "Category facet for {} sits outside the first {} facets; ignoring it",
                    parent_id, window
                );
            }
            return Ok(Vec::new());
        };

        let values = match facet.get("values") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(values) => Vec::<FacetValue>::deserialize(values).map_err(|e| {
                ScanError::FacetParse(format!("facet `{}` for {}: {}", label, parent_id, e))
            })?,
        };

        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let missing = |field: &str| {
                    ScanError::FacetParse(format!(
                        "value {} of facet `{}` for {} has no `{}`",
                        i, label, parent_id, field
                    ))
                };
                Ok(ChildNode {
                    parent_id: parent_id.to_string(),
                    id: value.id.clone().ok_or_else(|| missing("id"))?,
                    title: value.title.clone().ok_or_else(|| missing("title"))?,
                    path: value
                        .url
                        .as_deref()
                        .ok_or_else(|| missing("url"))?
                        .replace('+', "%20"),
                })
            })
            .collect()
    }
}

/// Remote facet lookup for one node.
#[async_trait]
pub trait FacetSource: Send + Sync {
    async fn fetch_facets(&self, node: &LevelNode) -> Result<FacetResponse>;
}

#[derive(Debug, Clone)]
pub struct FacetApiOptions {
    pub endpoint: String,
    /// Appended verbatim after the per-node parameters.
    pub extra_query: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Default for FacetApiOptions {
    fn default() -> Self {
        Self {
            endpoint: "https://www.falabella.com.pe/s/browse/v1/listing/pe".to_string(),
            extra_query: "pgid=2&pid=799c102f-9b4c-44be-a421-23e366a63b82\
                &zones=912_LIMA_2%2COLVAA_81%2CLIMA_URB1_DIRECTO%2CURBANO_83%2CIBIS_19\
                %2C912_LIMA_1%2C150101%2CPERF_TEST%2C150000"
                .to_string(),
            headers: desktop_browser_headers(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Headers identifying the caller as a desktop browser on the storefront.
pub fn desktop_browser_headers() -> Vec<(String, String)> {
    [
        ("accept", "*/*"),
        (
            "accept-language",
            "es,es-ES;q=0.9,en;q=0.8,en-GB;q=0.7,en-US;q=0.6",
        ),
        ("content-type", "application/json"),
        (
            "sec-ch-ua",
            r#""Chromium";v="110", "Not A(Brand";v="24", "Microsoft Edge";v="110""#,
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-platform", r#""Windows""#),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        ("x-device-type", "desktop"),
        ("referer", "https://www.falabella.com.pe/"),
        ("referrer-policy", "strict-origin-when-cross-origin"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub struct FacetClient {
    client: Client,
    endpoint: String,
    extra_query: String,
}

impl FacetClient {
    pub fn new(options: &FacetApiOptions) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ScanError::Configuration(format!("header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ScanError::Configuration(format!("header value {}: {}", value, e)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .connect_timeout(options.timeout / 2)
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint: options.endpoint.clone(),
            extra_query: options.extra_query.clone(),
        })
    }

    /// The listing URL for `node`. The facet path is spliced in as-is; it is
    /// already a query fragment produced by the API itself.
    pub fn request_url(&self, node: &LevelNode) -> String {
        let name: String = url::form_urlencoded::byte_serialize(node.name.as_bytes()).collect();
        let mut url = format!(
            "{}?=&{}&page=1&categoryId={}&categoryName={}",
            self.endpoint, node.path, node.id, name
        );
        if !self.extra_query.is_empty() {
            url.push('&');
            url.push_str(&self.extra_query);
        }
        url
    }
}

#[async_trait]
impl FacetSource for FacetClient {
    async fn fetch_facets(&self, node: &LevelNode) -> Result<FacetResponse> {
        let url = self.request_url(node);
        debug!("Fetching facets for {} ({})", node.id, url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::UnexpectedStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        FacetResponse::from_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    fn node(id: &str, name: &str, path: &str) -> LevelNode {
        LevelNode {
            id: id.to_string(),
            name: name.to_string(),
            path: path.to_string(),
        }
    }

    fn options_for(server: &MockServer) -> FacetApiOptions {
        FacetApiOptions {
            endpoint: format!("{}/s/browse/v1/listing/pe", server.uri()),
            extra_query: "pgid=2".to_string(),
            ..FacetApiOptions::default()
        }
    }

    #[test]
    fn test_reverse_scan_within_window() {
        let body = r#"{"data":{"facets":[
            {"name":"Marca","values":[]},
            {"name":"Categoría","values":[{"id":"c1","title":"Early","url":"a"}]},
            {"name":"Precio","values":[]},
            {"name":"Categoría","values":[{"id":"c2","title":"Late","url":"b+c"}]}
        ]}}"#;
        let response = FacetResponse::from_json(body).unwrap();
        let children = response
            .category_children("7", DEFAULT_CATEGORY_LABEL, DEFAULT_FACET_WINDOW)
            .unwrap();

        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "c2");
        assert_eq!(children[0].parent_id, "7");
        assert_eq!(children[0].path, "b%20c");
    }

    #[test]
    fn test_category_facet_outside_window_is_ignored() {
        let body = r#"{"data":{"facets":[
            {"name":"A","values":[]},
            {"name":"B","values":[]},
            {"name":"C","values":[]},
            {"name":"D","values":[]},
            {"name":"Categoría","values":[{"id":"c1","title":"Hidden","url":"x"}]}
        ]}}"#;
        let response = FacetResponse::from_json(body).unwrap();
        let children = response
            .category_children("7", DEFAULT_CATEGORY_LABEL, DEFAULT_FACET_WINDOW)
            .unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn test_numeric_ids_are_accepted() {
        let body = r#"{"data":{"facets":[
            {"name":"Category","values":[{"id":8,"title":"Men","url":"m"}]}
        ]}}"#;
        let response = FacetResponse::from_json(body).unwrap();
        let children = response.category_children("7", "Category", 4).unwrap();
        assert_eq!(children[0].id, "8");
    }

    #[test]
    fn test_null_values_on_other_facet_keep_children() {
        let body = r#"{"data":{"facets":[
            {"name":"Categoría","values":[{"id":"c1","title":"Men","url":"m"}]},
            {"name":"Envío","values":null}
        ]}}"#;
        let response = FacetResponse::from_json(body).unwrap();
        let children = response
            .category_children("7", DEFAULT_CATEGORY_LABEL, DEFAULT_FACET_WINDOW)
            .unwrap();

        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "c1");
    }

    #[test]
    fn test_malformed_facet_outside_window_is_ignored() {
        let body = r#"{"data":{"facets":[
            {"name":"Categoría","values":[{"id":"c1","title":"Men","url":"m"}]},
            {"name":"B","values":[]},
            {"name":"C","values":[]},
            {"name":"D","values":[]},
            {"title":5},
            null
        ]}}"#;
        let response = FacetResponse::from_json(body).unwrap();
        let children = response
            .category_children("7", DEFAULT_CATEGORY_LABEL, DEFAULT_FACET_WINDOW)
            .unwrap();

        assert_eq!(children.len(), 1);
        assert_eq!(children[0].title, "Men");
    }

    #[test]
    fn test_category_facet_with_null_values_has_no_children() {
        let body = r#"{"data":{"facets":[{"name":"Categoría","values":null}]}}"#;
        let response = FacetResponse::from_json(body).unwrap();
        let children = response
            .category_children("7", DEFAULT_CATEGORY_LABEL, DEFAULT_FACET_WINDOW)
            .unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn test_numeric_title_in_category_facet_is_accepted() {
        let body = r#"{"data":{"facets":[
            {"name":"Category","values":[{"id":8,"title":2024,"url":"m"}]}
        ]}}"#;
        let response = FacetResponse::from_json(body).unwrap();
        let children = response.category_children("7", "Category", 4).unwrap();
        assert_eq!(children[0].title, "2024");
    }

    #[test]
    fn test_malformed_category_values_are_a_parse_error() {
        let body = r#"{"data":{"facets":[{"name":"Categoría","values":{"id":"c1"}}]}}"#;
        let response = FacetResponse::from_json(body).unwrap();
        let err = response
            .category_children("7", DEFAULT_CATEGORY_LABEL, DEFAULT_FACET_WINDOW)
            .unwrap_err();
        assert!(matches!(err, ScanError::FacetParse(_)));
    }

    #[test]
    fn test_missing_data_is_a_parse_error() {
        let response = FacetResponse::from_json(r#"{"success":false}"#).unwrap();
        let err = response
            .category_children("7", DEFAULT_CATEGORY_LABEL, DEFAULT_FACET_WINDOW)
            .unwrap_err();
        assert!(matches!(err, ScanError::FacetParse(_)));
    }

    #[test]
    fn test_incomplete_value_is_a_parse_error() {
        let body = r#"{"data":{"facets":[
            {"name":"Categoría","values":[{"id":"c1","url":"x"}]}
        ]}}"#;
        let response = FacetResponse::from_json(body).unwrap();
        assert!(
            response
                .category_children("7", DEFAULT_CATEGORY_LABEL, DEFAULT_FACET_WINDOW)
                .is_err()
        );
    }

    #[test]
    fn test_invalid_json_is_a_parse_error() {
        assert!(matches!(
            FacetResponse::from_json("<html>blocked</html>"),
            Err(ScanError::FacetParse(_))
        ));
    }

    #[test]
    fn test_request_url_layout() {
        let client = FacetClient::new(&FacetApiOptions {
            endpoint: "https://shop.example/listing".to_string(),
            extra_query: "pgid=2".to_string(),
            ..FacetApiOptions::default()
        })
        .unwrap();

        let url = client.request_url(&node("cat1", "Moda Mujer", "facet=a%20b"));
        assert_eq!(
            url,
            "https://shop.example/listing?=&facet=a%20b&page=1&categoryId=cat1\
             &categoryName=Moda+Mujer&pgid=2"
        );
    }

    #[tokio::test]
    async fn test_fetch_facets_sends_browser_headers() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/s/browse/v1/listing/pe"))
            .and(query_param("categoryId", "cat1"))
            .and(query_param("categoryName", "Tecnología"))
            .and(header("x-device-type", "desktop"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"data":{"facets":[{"name":"Categoría","values":[
                    {"id":"cat2","title":"Laptops","url":"f=cat2"}]}]}}"#,
            ))
            .mount(&mock_server)
            .await;

        let client = FacetClient::new(&options_for(&mock_server)).unwrap();
        let response = client
            .fetch_facets(&node("cat1", "Tecnología", ""))
            .await
            .unwrap();
        let children = response
            .category_children("cat1", DEFAULT_CATEGORY_LABEL, DEFAULT_FACET_WINDOW)
            .unwrap();

        assert_eq!(children.len(), 1);
        assert_eq!(children[0].title, "Laptops");
    }

    #[tokio::test]
    async fn test_fetch_facets_server_error_is_transport_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = FacetClient::new(&options_for(&mock_server)).unwrap();
        let err = client
            .fetch_facets(&node("cat1", "Hogar", ""))
            .await
            .unwrap_err();

        assert!(err.is_transport());
        assert!(matches!(err, ScanError::UnexpectedStatus { status: 503, .. }));
    }
}
