use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    FromRow, SqlitePool,
};

use crate::Result;

#[derive(Debug, Clone, FromRow)]
pub struct SeenRecord {
    pub id: i64,
    pub entry_id: String,
    pub url_hash: String,
    pub published_at: Option<String>,
    pub created_at: String,
}

/// Durable record of every entry that has been announced.
///
/// Rows are only ever inserted. A row exists iff the matching notification
/// was sent successfully.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect using a sqlx URL such as `sqlite::memory:` or `sqlite:feeds.db?mode=rwc`.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to `:memory:` is a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Open (or create) the database file at `path`, creating parent directories.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id TEXT,
                url_hash TEXT,
                published_at TIMESTAMP,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entry_id ON seen_entries(entry_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_url_hash ON seen_entries(url_hash)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// True if any record matches `entry_id` or the hash of `canonical_link`.
    pub async fn is_seen(&self, entry_id: &str, canonical_link: &str) -> Result<bool> {
        let url_hash = hash_link(canonical_link);

        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM seen_entries WHERE entry_id = ? OR url_hash = ? LIMIT 1",
        )
        .bind(entry_id)
        .bind(&url_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Append a record. Call only after the entry was sent successfully.
    pub async fn record_seen(
        &self,
        entry_id: &str,
        canonical_link: &str,
        published_at: DateTime<Utc>,
    ) -> Result<()> {
        let url_hash = hash_link(canonical_link);
        let created_at = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO seen_entries (entry_id, url_hash, published_at, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(entry_id)
        .bind(&url_hash)
        .bind(published_at.to_rfc3339())
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn seen_count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM seen_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// All records in insertion order.
    pub async fn seen_records(&self) -> Result<Vec<SeenRecord>> {
        let records = sqlx::query_as::<_, SeenRecord>(
            r#"
            SELECT id, entry_id, url_hash, published_at, created_at
            FROM seen_entries
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

/// Lowercase hex SHA-256 of a canonical link.
pub fn hash_link(link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(link.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
