use crate::error::ExtractionError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub const FIELD_LISTING: &str = "Listing";
pub const FIELD_PRICE: &str = "Price";
pub const FIELD_URL: &str = "URL";
pub const FIELD_SOURCE: &str = "Source";

/// Fields every record carries. Attribute tables may not overwrite them.
pub const RESERVED_FIELDS: [&str; 4] = [FIELD_LISTING, FIELD_PRICE, FIELD_URL, FIELD_SOURCE];

/// Absolute URL of one detail page
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListingRef(String);

impl ListingRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One scraped car, as a semi-structured document.
///
/// Built through [`CarRecordBuilder`]; there is no way to change a record once
/// it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CarRecord {
    fields: BTreeMap<String, String>,
}

impl CarRecord {
    pub fn builder(source: &str, url: &str) -> CarRecordBuilder {
        CarRecordBuilder::new(source, url)
    }

    /// Rebuild a record from a stored JSON document
    pub fn from_document(json: &str) -> anyhow::Result<Self> {
        let fields: BTreeMap<String, String> = serde_json::from_str(json)?;
        let url = fields.get(FIELD_URL).cloned().unwrap_or_default();
        let source = fields.get(FIELD_SOURCE).cloned().unwrap_or_default();

        let mut builder = CarRecordBuilder::new(&source, &url);
        for (key, value) in fields {
            builder = builder.field(&key, &value);
        }
        Ok(builder.build()?)
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn listing(&self) -> &str {
        self.get(FIELD_LISTING).unwrap_or_default()
    }

    pub fn price(&self) -> &str {
        self.get(FIELD_PRICE).unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        self.get(FIELD_URL).unwrap_or_default()
    }

    pub fn source(&self) -> &str {
        self.get(FIELD_SOURCE).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn to_document(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.fields)
    }
}

pub struct CarRecordBuilder {
    fields: BTreeMap<String, String>,
}

impl CarRecordBuilder {
    fn new(source: &str, url: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(FIELD_URL.to_string(), url.trim().to_string());
        fields.insert(FIELD_SOURCE.to_string(), source.trim().to_string());
        Self { fields }
    }

    /// Set a named field. `URL` and `Source` are fixed at construction.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        let name = name.trim();
        if name == FIELD_URL || name == FIELD_SOURCE {
            return self;
        }
        self.fields.insert(name.to_string(), value.trim().to_string());
        self
    }

    /// Add an attribute-table row. Reserved fields and empty keys are ignored.
    pub fn attribute(self, key: &str, value: &str) -> Self {
        let key = key.trim().trim_end_matches(':').trim();
        if key.is_empty() || RESERVED_FIELDS.contains(&key) {
            tracing::trace!("Ignoring attribute row with key '{}'", key);
            return self;
        }
        self.field(key, value)
    }

    pub fn build(self) -> Result<CarRecord, ExtractionError> {
        let url = self.fields.get(FIELD_URL).cloned().unwrap_or_default();

        for required in RESERVED_FIELDS {
            let present = self
                .fields
                .get(required)
                .is_some_and(|v| !v.is_empty());
            if !present {
                return Err(ExtractionError {
                    field: required.to_string(),
                    url,
                });
            }
        }

        Ok(CarRecord {
            fields: self.fields,
        })
    }
}
