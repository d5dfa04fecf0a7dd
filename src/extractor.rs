//! Detail Extractor: one detail page in, one `CarRecord` (or the reason why not) out.

use crate::adapter::{AttributeTable, SiteAdapter};
use crate::error::{DetailError, ExtractionError, ParseError};
use crate::http_client::Fetcher;
use crate::markup;
use crate::models::{CarRecord, CarRecordBuilder, ListingRef};
use scraper::Html;

pub async fn extract<F: Fetcher + ?Sized>(
    adapter: &SiteAdapter,
    fetcher: &F,
    listing: &ListingRef,
) -> Result<CarRecord, DetailError> {
    let body = fetcher.fetch(listing.as_str()).await?;
    extract_from_html(adapter, listing, &body)
}

/// Apply the adapter's field map to an already fetched page
pub fn extract_from_html(
    adapter: &SiteAdapter,
    listing: &ListingRef,
    body: &str,
) -> Result<CarRecord, DetailError> {
    let url = listing.as_str();
    let document = markup::parse_document(url, body)?;
    let mut builder = CarRecord::builder(&adapter.source_name, url);

    for rule in &adapter.fields {
        let mut value = markup::locate(&document, &rule.locate)?;
        if value.is_none() {
            if let Some(fallback) = &rule.fallback {
                tracing::trace!("{}: trying fallback rule for {}", url, rule.field);
                value = markup::locate(&document, fallback)?;
            }
        }

        match value {
            Some(value) => builder = builder.field(&rule.field, &value),
            None if rule.is_required() => {
                return Err(ExtractionError {
                    field: rule.field.clone(),
                    url: url.to_string(),
                }
                .into());
            }
            None => tracing::debug!("{}: optional field {} not found", url, rule.field),
        }
    }

    for table in &adapter.attribute_tables {
        builder = read_attribute_table(&document, table, builder, url)?;
    }

    Ok(builder.build()?)
}

/// Add every complete key/value row; rows missing either side are skipped
fn read_attribute_table(
    document: &Html,
    table: &AttributeTable,
    mut builder: CarRecordBuilder,
    url: &str,
) -> Result<CarRecordBuilder, ParseError> {
    let container_sel = markup::selector(&table.container)?;
    let row_sel = markup::selector(&table.row)?;
    let key_sel = markup::selector(&table.key)?;
    let value_sel = markup::selector(&table.value)?;

    let mut rows = 0;
    let mut skipped = 0;
    for container in document.select(&container_sel) {
        for row in container.select(&row_sel) {
            let key = row
                .select(&key_sel)
                .next()
                .map(|el| markup::element_text(&el))
                .filter(|k| !k.is_empty());
            let value = row
                .select(&value_sel)
                .next()
                .map(|el| markup::element_text(&el))
                .filter(|v| !v.is_empty());

            match (key, value) {
                (Some(key), Some(value)) => {
                    builder = builder.attribute(&key, &value);
                    rows += 1;
                }
                _ => skipped += 1,
            }
        }
    }

    tracing::trace!(
        "{}: read {} attribute rows from '{}', skipped {}",
        url, rows, table.container, skipped
    );
    Ok(builder)
}
