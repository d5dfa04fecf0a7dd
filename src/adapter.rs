//! Declarative description of how to scrape one site.
//!
//! An adapter is plain data: CSS selectors, a pagination rule and a field map.
//! The walker and extractor interpret it; nothing here talks to the network.

use crate::error::ParseError;
use crate::markup;
use crate::models::{FIELD_LISTING, FIELD_PRICE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteAdapter {
    /// Value written to every record's `Source` field
    pub source_name: String,
    /// First index page of the walk
    pub base_url: String,
    /// Matches each listing's link (or a container holding one) on an index page
    pub listing_link_selector: String,
    pub pagination: Pagination,
    #[serde(rename = "field_selectors")]
    pub fields: Vec<FieldRule>,
    #[serde(default)]
    pub attribute_tables: Vec<AttributeTable>,
    /// Base that relative listing links are resolved against
    pub detail_url_prefix: String,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

fn default_request_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum Pagination {
    /// Increment a page-number query parameter until `terminal` fires
    QueryParam {
        param_name: String,
        terminal: Terminal,
    },
    /// Follow the next-page marker's `href` until the marker disappears
    NextLinkAbsent { next_marker: Marker },
}

/// Condition on an index page that means "no more pages"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Terminal {
    MarkerPresent { marker: Marker },
    MarkerAbsent { marker: Marker },
    NoListings,
}

/// An element identified by selector and, optionally, its exact text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// How to reach a value on a detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    pub selector: String,
    /// Only match elements whose trimmed text equals this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<Step>,
    /// Read this attribute instead of the element text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,
}

/// Move from a located element to a related one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "selector", rename_all = "snake_case")]
pub enum Step {
    /// First matching element after this one in document order
    Following(String),
    NextSibling(String),
    /// First matching descendant
    Child(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    #[serde(flatten)]
    pub locate: Locator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Locator>,
    #[serde(default)]
    pub required: bool,
}

impl FieldRule {
    /// `Listing` and `Price` are required whatever the adapter says
    pub fn is_required(&self) -> bool {
        self.required || self.field == FIELD_LISTING || self.field == FIELD_PRICE
    }
}

/// Key/value rows under a shared container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeTable {
    pub container: String,
    pub row: String,
    pub key: String,
    pub value: String,
}

impl SiteAdapter {
    /// Collection name in the document store
    pub fn collection(&self) -> String {
        self.source_name.to_lowercase()
    }

    /// Check every selector compiles and both core fields have rules
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source_name.trim().is_empty() {
            anyhow::bail!("adapter has an empty source_name");
        }
        reqwest::Url::parse(&self.base_url).map_err(|e| {
            anyhow::anyhow!("{}: invalid base_url '{}': {}", self.source_name, self.base_url, e)
        })?;
        reqwest::Url::parse(&self.detail_url_prefix).map_err(|e| {
            anyhow::anyhow!(
                "{}: invalid detail_url_prefix '{}': {}",
                self.source_name,
                self.detail_url_prefix,
                e
            )
        })?;

        for field in [FIELD_LISTING, FIELD_PRICE] {
            if !self.fields.iter().any(|rule| rule.field == field) {
                anyhow::bail!("{}: no rule for required field '{}'", self.source_name, field);
            }
        }

        self.selectors()
            .into_iter()
            .try_for_each(|s| markup::selector(s).map(|_| ()))
            .map_err(|e: ParseError| anyhow::anyhow!("{}: {}", self.source_name, e))
    }

    fn selectors(&self) -> Vec<&str> {
        let mut all = vec![self.listing_link_selector.as_str()];

        match &self.pagination {
            Pagination::QueryParam { terminal, .. } => match terminal {
                Terminal::MarkerPresent { marker } | Terminal::MarkerAbsent { marker } => {
                    all.push(&marker.selector)
                }
                Terminal::NoListings => {}
            },
            Pagination::NextLinkAbsent { next_marker } => all.push(&next_marker.selector),
        }

        for rule in &self.fields {
            for locator in std::iter::once(&rule.locate).chain(rule.fallback.as_ref()) {
                all.push(&locator.selector);
                if let Some(step) = &locator.then {
                    all.push(step.selector());
                }
            }
        }

        for table in &self.attribute_tables {
            all.extend([
                table.container.as_str(),
                table.row.as_str(),
                table.key.as_str(),
                table.value.as_str(),
            ]);
        }

        all
    }
}

impl Step {
    pub fn selector(&self) -> &str {
        match self {
            Step::Following(s) | Step::NextSibling(s) | Step::Child(s) => s,
        }
    }
}
