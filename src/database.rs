use crate::error::StoreError;
use crate::models::CarRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    Updated,
}

/// Where finished records go
pub trait Sink {
    /// Insert or overwrite the document for `record.url()`
    fn store(&self, collection: &str, record: &CarRecord) -> Result<StoreOutcome, StoreError>;
}

pub struct StoredDocument {
    pub id: Uuid,
    pub collection: String,
    pub record: CarRecord,
    pub first_seen_at: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
}

/// SQLite-backed document store, one logical collection per site
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path))?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Database {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                url TEXT NOT NULL,
                document TEXT NOT NULL,
                first_seen_at TEXT NOT NULL,
                scraped_at TEXT NOT NULL,
                UNIQUE (collection, url)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)",
            [],
        )?;

        Ok(())
    }

    /// Upsert keyed by URL. The document id and `first_seen_at` survive overwrites.
    pub fn upsert(&self, collection: &str, record: &CarRecord) -> Result<StoreOutcome, StoreError> {
        let document = record.to_document()?;
        let now = Utc::now();

        let existing = self.document_id(collection, record.url())?;

        self.conn.execute(
            "INSERT INTO documents (id, collection, url, document, first_seen_at, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (collection, url) DO UPDATE SET
                document = excluded.document,
                scraped_at = excluded.scraped_at",
            params![
                Uuid::new_v4().to_string(),
                collection,
                record.url(),
                document,
                now,
            ],
        )?;

        Ok(match existing {
            Some(_) => StoreOutcome::Updated,
            None => StoreOutcome::Inserted,
        })
    }

    pub fn document_id(&self, collection: &str, url: &str) -> Result<Option<Uuid>, StoreError> {
        let id: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM documents WHERE collection = ?1 AND url = ?2",
                params![collection, url],
                |row| row.get(0),
            )
            .optional()?;

        Ok(id.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    pub fn get(&self, collection: &str, url: &str) -> Result<Option<StoredDocument>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, collection, document, first_seen_at, scraped_at
                 FROM documents WHERE collection = ?1 AND url = ?2",
                params![collection, url],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, DateTime<Utc>>(3)?,
                        row.get::<_, DateTime<Utc>>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, collection, document, first_seen_at, scraped_at)| -> Result<StoredDocument> {
            Ok(StoredDocument {
                id: Uuid::parse_str(&id)?,
                collection,
                record: CarRecord::from_document(&document)?,
                first_seen_at,
                scraped_at,
            })
        })
        .transpose()
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Every stored record, optionally restricted to some collections
    pub fn records(&self, collections: &[String]) -> Result<Vec<CarRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT collection, document FROM documents ORDER BY collection, url")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (collection, document) in rows {
            if !collections.is_empty() && !collections.contains(&collection) {
                continue;
            }
            match CarRecord::from_document(&document) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable document in {}: {}", collection, e),
            }
        }

        Ok(records)
    }
}

impl Sink for Database {
    fn store(&self, collection: &str, record: &CarRecord) -> Result<StoreOutcome, StoreError> {
        self.upsert(collection, record)
    }
}
