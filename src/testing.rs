//! In-memory fetchers and fixtures shared by the unit tests

use crate::adapter::SiteAdapter;
use crate::error::FetchError;
use crate::http_client::{FetchResult, Fetcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Serves canned pages by URL; anything else is a 404
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> FetchResult {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
            reason: "Not Found".to_string(),
        })
    }
}

/// Builds every page from its URL
pub struct FnFetcher<F>(pub F);

#[async_trait]
impl<F> Fetcher for FnFetcher<F>
where
    F: Fn(&str) -> FetchResult + Send + Sync,
{
    async fn fetch(&self, url: &str) -> FetchResult {
        (self.0)(url)
    }
}

pub const TEST_SITE_YAML: &str = r#"
source_name: TestSite
base_url: https://cars.test/listings
listing_link_selector: a.car
detail_url_prefix: https://cars.test/
request_delay_ms: 0
pagination:
  style: next_link_absent
  next_marker:
    selector: a.next
field_selectors:
  - field: Listing
    selector: h1.title
  - field: Price
    selector: span.price
  - field: Details
    selector: div.tags
attribute_tables:
  - container: div.specs
    row: div.row
    key: span.key
    value: span.value
"#;

/// Adapter for the fake `cars.test` site used throughout the tests
pub fn test_adapter() -> SiteAdapter {
    serde_yaml::from_str(TEST_SITE_YAML).unwrap()
}

/// Index page with the given relative listing links and optional next link
pub fn index_page(links: &[&str], next: Option<&str>) -> String {
    let mut html = String::from("<html><body><ul>");
    for link in links {
        html.push_str(&format!(r#"<li><a class="car" href="{}">car</a></li>"#, link));
    }
    html.push_str("</ul>");
    if let Some(next) = next {
        html.push_str(&format!(r#"<a class="next" href="{}">Next</a>"#, next));
    }
    html.push_str("</body></html>");
    html
}

/// Detail page; `None` leaves the element out entirely
pub fn detail_page(title: Option<&str>, price: Option<&str>, rows: &[(Option<&str>, Option<&str>)]) -> String {
    let mut html = String::from("<html><body>");
    if let Some(title) = title {
        html.push_str(&format!(r#"<h1 class="title">{}</h1>"#, title));
    }
    if let Some(price) = price {
        html.push_str(&format!(r#"<span class="price">{}</span>"#, price));
    }
    html.push_str(r#"<div class="specs">"#);
    for (key, value) in rows {
        html.push_str(r#"<div class="row">"#);
        if let Some(key) = key {
            html.push_str(&format!(r#"<span class="key">{}</span>"#, key));
        }
        if let Some(value) = value {
            html.push_str(&format!(r#"<span class="value">{}</span>"#, value));
        }
        html.push_str("</div>");
    }
    html.push_str("</div></body></html>");
    html
}
