//! Walk -> extract -> store, for one site.

use crate::adapter::SiteAdapter;
use crate::database::{Sink, StoreOutcome};
use crate::extractor;
use crate::http_client::Fetcher;
use crate::models::CarRecord;
use crate::walker::ListingWalker;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// A listing that did not make it into the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub source: String,
    pub pages_fetched: u32,
    pub listings_seen: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: Vec<Skipped>,
    pub ceiling_reached: bool,
    pub cancelled: bool,
    /// Set when an index page failed and the walk ended early
    pub index_failure: Option<String>,
}

impl RunSummary {
    pub fn stored(&self) -> usize {
        self.inserted + self.updated
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} pages, {} listings, {} stored ({} new, {} updated), {} skipped",
            self.source,
            self.pages_fetched,
            self.listings_seen,
            self.stored(),
            self.inserted,
            self.updated,
            self.skipped.len()
        )?;
        if self.ceiling_reached {
            write!(f, ", page ceiling reached")?;
        }
        if self.cancelled {
            write!(f, ", cancelled")?;
        }
        if let Some(failure) = &self.index_failure {
            write!(f, ", index failure: {}", failure)?;
        }
        Ok(())
    }
}

pub struct RunOptions {
    pub max_pages: u32,
    /// Extract but do not store
    pub dry_run: bool,
}

/// Run one site's pipeline to completion.
///
/// Per-listing failures are logged and recorded in the summary; only the walk
/// ending (normally, at the ceiling, on an index failure or on cancellation)
/// stops the run.
pub async fn run_site<F, S>(
    adapter: &SiteAdapter,
    fetcher: &F,
    sink: &S,
    options: &RunOptions,
    cancel: &CancellationToken,
) -> (RunSummary, Vec<CarRecord>)
where
    F: Fetcher + ?Sized,
    S: Sink + ?Sized,
{
    let collection = adapter.collection();
    let mut summary = RunSummary {
        source: adapter.source_name.clone(),
        ..Default::default()
    };
    let mut extracted = Vec::new();

    tracing::info!("Scraping {} starting at {}", adapter.source_name, adapter.base_url);

    let mut walker = ListingWalker::new(adapter, fetcher, &adapter.base_url, options.max_pages);

    loop {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let listing = match walker.next().await {
            Ok(Some(listing)) => listing,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("{}: index page failed, ending run: {}", adapter.source_name, e);
                summary.index_failure = Some(e.to_string());
                break;
            }
        };

        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let record = match extractor::extract(adapter, fetcher, &listing).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", listing, e);
                summary.skipped.push(Skipped {
                    url: listing.to_string(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        tracing::debug!("Extracted '{}' ({} fields)", record.listing(), record.len());

        if options.dry_run {
            extracted.push(record);
            continue;
        }

        match sink.store(&collection, &record) {
            Ok(StoreOutcome::Inserted) => summary.inserted += 1,
            Ok(StoreOutcome::Updated) => summary.updated += 1,
            Err(e) => {
                tracing::warn!("Failed to store {}: {}", listing, e);
                summary.skipped.push(Skipped {
                    url: listing.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    summary.pages_fetched = walker.pages_fetched();
    summary.listings_seen = walker.refs_seen();
    summary.ceiling_reached = walker.ceiling_reached();

    if summary.cancelled {
        tracing::warn!("{}: run cancelled", adapter.source_name);
    }
    tracing::info!("{}", summary);

    (summary, extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::error::StoreError;
    use crate::testing::{detail_page, index_page, test_adapter, FnFetcher, StaticFetcher};
    use std::sync::{Arc, Mutex};

    const START: &str = "https://cars.test/listings";

    fn options() -> RunOptions {
        RunOptions {
            max_pages: 10,
            dry_run: false,
        }
    }

    fn complete(title: &str) -> String {
        detail_page(Some(title), Some("GH₵ 10,000"), &[(Some("Make"), Some("Toyota"))])
    }

    /// Records every store call and fails for chosen URLs
    struct FlakySink {
        fail_for: String,
        stored: Mutex<Vec<String>>,
    }

    impl Sink for FlakySink {
        fn store(&self, _collection: &str, record: &CarRecord) -> Result<StoreOutcome, StoreError> {
            if record.url() == self.fail_for {
                return Err(StoreError::Database(rusqlite::Error::InvalidQuery));
            }
            self.stored.lock().unwrap().push(record.url().to_string());
            Ok(StoreOutcome::Inserted)
        }
    }

    #[tokio::test]
    async fn test_three_listings_single_page() {
        let adapter = test_adapter();
        let fetcher = StaticFetcher::new()
            .page(START, &index_page(&["/cars/1", "/cars/2", "/cars/3"], None))
            .page("https://cars.test/cars/1", &complete("Car 1"))
            .page("https://cars.test/cars/2", &complete("Car 2"))
            .page("https://cars.test/cars/3", &complete("Car 3"));
        let db = Database::open_in_memory().unwrap();

        let (summary, _) = run_site(&adapter, &fetcher, &db, &options(), &CancellationToken::new()).await;

        assert_eq!(summary.pages_fetched, 1);
        assert_eq!(summary.listings_seen, 3);
        assert_eq!(summary.inserted, 3);
        assert!(summary.skipped.is_empty());
        assert!(!summary.ceiling_reached);

        let records = db.records(&[]).unwrap();
        assert_eq!(records.len(), 3);
        for record in &records {
            assert!(!record.listing().is_empty());
            assert_eq!(record.price(), "GH₵ 10,000");
            assert!(record.url().starts_with("https://cars.test/cars/"));
            assert_eq!(record.source(), "TestSite");
        }
    }

    #[tokio::test]
    async fn test_bad_listing_does_not_stop_run() {
        let adapter = test_adapter();
        let fetcher = StaticFetcher::new()
            .page(START, &index_page(&["/cars/1", "/cars/2", "/cars/3", "/cars/4"], None))
            .page("https://cars.test/cars/1", &complete("Car 1"))
            // no price
            .page("https://cars.test/cars/2", &detail_page(Some("Car 2"), None, &[]))
            // cars/3 is a 404
            .page("https://cars.test/cars/4", &complete("Car 4"));
        let db = Database::open_in_memory().unwrap();

        let (summary, _) = run_site(&adapter, &fetcher, &db, &options(), &CancellationToken::new()).await;

        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.skipped.len(), 2);
        assert_eq!(summary.skipped[0].url, "https://cars.test/cars/2");
        assert!(summary.skipped[0].reason.contains("Price"));
        assert_eq!(summary.skipped[1].url, "https://cars.test/cars/3");
        assert!(summary.skipped[1].reason.contains("404"));
        assert!(db.get("testsite", "https://cars.test/cars/4").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_store_failure_is_recovered_per_record() {
        let adapter = test_adapter();
        let fetcher = StaticFetcher::new()
            .page(START, &index_page(&["/cars/1", "/cars/2"], None))
            .page("https://cars.test/cars/1", &complete("Car 1"))
            .page("https://cars.test/cars/2", &complete("Car 2"));
        let sink = FlakySink {
            fail_for: "https://cars.test/cars/1".to_string(),
            stored: Mutex::new(Vec::new()),
        };

        let (summary, _) = run_site(&adapter, &fetcher, &sink, &options(), &CancellationToken::new()).await;

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(*sink.stored.lock().unwrap(), vec!["https://cars.test/cars/2".to_string()]);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let adapter = test_adapter();
        let fetcher = StaticFetcher::new()
            .page(START, &index_page(&["/cars/1", "/cars/2"], None))
            .page("https://cars.test/cars/1", &complete("Car 1"))
            .page("https://cars.test/cars/2", &complete("Car 2"));
        let db = Database::open_in_memory().unwrap();
        let cancel = CancellationToken::new();

        run_site(&adapter, &fetcher, &db, &options(), &cancel).await;
        let (second, _) = run_site(&adapter, &fetcher, &db, &options(), &cancel).await;

        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 2);
        assert_eq!(db.count("testsite").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_index_failure_is_reported() {
        let adapter = test_adapter();
        let fetcher = StaticFetcher::new();
        let db = Database::open_in_memory().unwrap();

        let (summary, _) = run_site(&adapter, &fetcher, &db, &options(), &CancellationToken::new()).await;

        assert_eq!(summary.stored(), 0);
        assert!(summary.index_failure.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_cancelled_run_fetches_nothing() {
        let adapter = test_adapter();
        let fetcher = StaticFetcher::new().page(START, &index_page(&["/cars/1"], None));
        let db = Database::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (summary, _) = run_site(&adapter, &fetcher, &db, &options(), &cancel).await;

        assert!(summary.cancelled);
        assert!(fetcher.requests().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_next_link_keeps_page_listings() {
        let adapter = test_adapter();
        let fetcher = StaticFetcher::new()
            .page(START, &index_page(&["/cars/1", "/cars/2"], Some("#")))
            .page("https://cars.test/cars/1", &complete("Car 1"))
            .page("https://cars.test/cars/2", &complete("Car 2"));
        let db = Database::open_in_memory().unwrap();

        let (summary, _) = run_site(&adapter, &fetcher, &db, &options(), &CancellationToken::new()).await;

        assert_eq!(summary.inserted, 2);
        assert!(summary.index_failure.is_none());
        assert_eq!(summary.listings_seen, summary.stored() + summary.skipped.len());
    }

    #[tokio::test]
    async fn test_cancel_during_detail_fetch_stops_before_next_listing() {
        let adapter = test_adapter();
        let cancel = CancellationToken::new();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let fetcher = {
            let cancel = cancel.clone();
            let requests = Arc::clone(&requests);
            FnFetcher(move |url: &str| {
                requests.lock().unwrap().push(url.to_string());
                if url == START {
                    return Ok(index_page(&["/cars/1", "/cars/2", "/cars/3"], None));
                }
                // Interrupt arrives while the first detail page is in flight
                cancel.cancel();
                Ok(complete(url))
            })
        };
        let db = Database::open_in_memory().unwrap();

        let (summary, _) = run_site(&adapter, &fetcher, &db, &options(), &cancel).await;

        assert!(summary.cancelled);
        assert_eq!(summary.inserted, 1);
        assert_eq!(
            *requests.lock().unwrap(),
            vec![START.to_string(), "https://cars.test/cars/1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_dry_run_returns_records_without_storing() {
        let adapter = test_adapter();
        let fetcher = StaticFetcher::new()
            .page(START, &index_page(&["/cars/1"], None))
            .page("https://cars.test/cars/1", &complete("Car 1"));
        let db = Database::open_in_memory().unwrap();
        let options = RunOptions {
            max_pages: 1,
            dry_run: true,
        };

        let (summary, records) = run_site(&adapter, &fetcher, &db, &options, &CancellationToken::new()).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].listing(), "Car 1");
        assert_eq!(summary.stored(), 0);
        assert_eq!(db.count("testsite").unwrap(), 0);
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            source: "Jiji".to_string(),
            pages_fetched: 50,
            listings_seen: 1000,
            inserted: 990,
            updated: 5,
            skipped: vec![Skipped {
                url: "https://jiji.com.gh/x".to_string(),
                reason: "required field `Price` missing".to_string(),
            }],
            ceiling_reached: true,
            ..Default::default()
        };

        assert_eq!(
            summary.to_string(),
            "Jiji: 50 pages, 1000 listings, 995 stored (990 new, 5 updated), 1 skipped, page ceiling reached"
        );
    }
}
