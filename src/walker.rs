//! Listing Index Walker: turns an adapter's index pages into detail URLs.

use crate::adapter::{Pagination, SiteAdapter, Terminal};
use crate::error::WalkError;
use crate::http_client::Fetcher;
use crate::markup;
use crate::models::ListingRef;
use std::collections::{HashSet, VecDeque};

/// Lazily walks index pages, yielding each detail URL once.
///
/// Pages are fetched on demand from [`ListingWalker::next`]. The walk ends when
/// the adapter's pagination rule says so, when `max_pages` pages have been
/// fetched, or on the first index-page failure. It cannot be restarted.
pub struct ListingWalker<'a, F: Fetcher + ?Sized> {
    adapter: &'a SiteAdapter,
    fetcher: &'a F,
    start_url: String,
    next_url: Option<String>,
    /// Page number of the next index fetch
    cursor: u32,
    max_pages: u32,
    pages_fetched: u32,
    pending: VecDeque<ListingRef>,
    seen: HashSet<ListingRef>,
    visited: HashSet<String>,
    ceiling_reached: bool,
    finished: bool,
    /// Index failure held back until `pending` drains
    failure: Option<WalkError>,
}

/// What one index page contributed
struct PageScan {
    links_found: usize,
    new_refs: usize,
    next_url: Option<String>,
}

impl<'a, F: Fetcher + ?Sized> ListingWalker<'a, F> {
    pub fn new(adapter: &'a SiteAdapter, fetcher: &'a F, start_url: &str, max_pages: u32) -> Self {
        Self {
            adapter,
            fetcher,
            start_url: start_url.to_string(),
            next_url: Some(start_url.to_string()),
            cursor: 1,
            max_pages,
            pages_fetched: 0,
            pending: VecDeque::new(),
            seen: HashSet::new(),
            visited: HashSet::new(),
            ceiling_reached: false,
            finished: false,
            failure: None,
        }
    }

    /// Next detail URL, `Ok(None)` once the walk is over.
    ///
    /// Refs already queued from a failing page are yielded first; the index
    /// failure is then returned once and later calls yield `Ok(None)`.
    pub async fn next(&mut self) -> Result<Option<ListingRef>, WalkError> {
        loop {
            if let Some(listing) = self.pending.pop_front() {
                return Ok(Some(listing));
            }
            if let Some(e) = self.failure.take() {
                return Err(e);
            }
            if self.finished {
                return Ok(None);
            }

            let Some(url) = self.next_url.take() else {
                self.finished = true;
                return Ok(None);
            };

            if self.pages_fetched >= self.max_pages {
                tracing::info!(
                    "{}: page ceiling of {} reached, not fetching {}",
                    self.adapter.source_name, self.max_pages, url
                );
                self.ceiling_reached = true;
                self.finished = true;
                return Ok(None);
            }

            if let Err(e) = self.scan(&url).await {
                self.finished = true;
                self.failure = Some(e);
            }
        }
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn refs_seen(&self) -> usize {
        self.seen.len()
    }

    /// Whether the walk stopped because of `max_pages` rather than pagination
    pub fn ceiling_reached(&self) -> bool {
        self.ceiling_reached
    }

    async fn scan(&mut self, url: &str) -> Result<(), WalkError> {
        tracing::info!(
            "{}: fetching index page {} ({})",
            self.adapter.source_name, self.cursor, url
        );

        let body = self.fetcher.fetch(url).await?;
        self.pages_fetched += 1;
        self.visited.insert(url.to_string());

        let scan = self.scan_body(url, &body)?;
        tracing::debug!(
            "{}: page {} had {} listing links, {} new",
            self.adapter.source_name, self.cursor, scan.links_found, scan.new_refs
        );

        self.cursor += 1;
        self.next_url = scan.next_url.filter(|next| {
            let fresh = !self.visited.contains(next);
            if !fresh {
                tracing::warn!(
                    "{}: next page {} was already visited, stopping",
                    self.adapter.source_name, next
                );
            }
            fresh
        });

        if self.next_url.is_none() {
            tracing::info!("{}: no more index pages", self.adapter.source_name);
        }
        Ok(())
    }

    fn scan_body(&mut self, url: &str, body: &str) -> Result<PageScan, WalkError> {
        let document = markup::parse_document(url, body)?;
        let link_sel = markup::selector(&self.adapter.listing_link_selector)?;

        let mut links_found = 0;
        let mut new_refs = 0;
        for element in document.select(&link_sel) {
            let Some(href) = markup::link_href(&element) else {
                tracing::trace!("Listing element without href on {}", url);
                continue;
            };
            links_found += 1;

            let resolved = match markup::resolve_url(&self.adapter.detail_url_prefix, href) {
                Ok(resolved) => resolved,
                Err(e) => {
                    tracing::debug!("Skipping listing link on {}: {}", url, e);
                    continue;
                }
            };

            let listing = ListingRef::new(resolved);
            if self.seen.insert(listing.clone()) {
                self.pending.push_back(listing);
                new_refs += 1;
            }
        }

        let next_url = match &self.adapter.pagination {
            Pagination::NextLinkAbsent { next_marker } => {
                match markup::find_marker(&document, next_marker)? {
                    Some(marker) => match markup::link_href(&marker) {
                        Some(href) => match markup::resolve_url(url, href) {
                            Ok(next) => Some(next),
                            Err(e) => {
                                tracing::warn!(
                                    "{}: next-page marker on {} is not followable: {}",
                                    self.adapter.source_name, url, e
                                );
                                None
                            }
                        },
                        None => {
                            tracing::warn!(
                                "{}: next-page marker on {} has no link",
                                self.adapter.source_name, url
                            );
                            None
                        }
                    },
                    None => None,
                }
            }
            Pagination::QueryParam {
                param_name,
                terminal,
            } => {
                let done = match terminal {
                    Terminal::MarkerPresent { marker } => {
                        markup::find_marker(&document, marker)?.is_some()
                    }
                    Terminal::MarkerAbsent { marker } => {
                        markup::find_marker(&document, marker)?.is_none()
                    }
                    Terminal::NoListings => links_found == 0,
                };

                if done {
                    None
                } else if new_refs == 0 {
                    // Page parameter ignored or past the last page
                    tracing::info!(
                        "{}: page {} yielded no new listings, stopping",
                        self.adapter.source_name, self.cursor
                    );
                    None
                } else {
                    let next_page = (self.cursor + 1).to_string();
                    Some(markup::with_query_param(&self.start_url, param_name, &next_page)?)
                }
            }
        };

        Ok(PageScan {
            links_found,
            new_refs,
            next_url,
        })
    }
}
