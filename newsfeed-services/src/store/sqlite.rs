//! SQLite entry store
//!
//! Entries live in a single `entries` table keyed by link. SQLite has no
//! change feed, so `watch` always reports it as unsupported and the change
//! notifier falls back to snapshot polling.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use newsfeed_core::{rank_by_views, rank_by_votes, NewsEntry};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, info};

use super::{search_tokens, ChangeStream, NewsStore, StoreError};

const ENTRY_COLUMNS: &str =
    "link, title, content, summary, published_at, votes, views, language, deleted";

/// Entry store backed by a single SQLite connection
pub struct SqliteNewsStore {
    conn: Mutex<Connection>,
    zone: Tz,
}

/// Raw column values of one row, converted outside the rusqlite callback
struct EntryRow {
    link: String,
    title: String,
    content: String,
    summary: String,
    published_at: i64,
    votes: i64,
    views: i64,
    language: String,
    deleted: bool,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            link: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            summary: row.get(3)?,
            published_at: row.get(4)?,
            votes: row.get(5)?,
            views: row.get(6)?,
            language: row.get(7)?,
            deleted: row.get::<_, i64>(8)? != 0,
        })
    }

    fn into_entry(self) -> Result<NewsEntry, StoreError> {
        let published = DateTime::from_timestamp_millis(self.published_at).ok_or_else(|| {
            StoreError::Corrupt {
                link: self.link.clone(),
                message: format!("bad timestamp {}", self.published_at),
            }
        })?;

        let mut entry =
            NewsEntry::new(self.link.as_str(), self.title, published).map_err(|e| {
                StoreError::Corrupt {
                    link: self.link.clone(),
                    message: e.to_string(),
                }
            })?;
        entry.set_published_at(published, published);
        entry.content = self.content;
        entry.summary = self.summary;
        entry.votes = self.votes;
        entry.views = self.views;
        entry.language = self.language;
        if self.deleted {
            entry.soft_delete();
        }
        Ok(entry)
    }
}

/// Dynamic `WHERE` clause with positional parameters
#[derive(Default)]
struct Filter {
    clauses: Vec<String>,
    values: Vec<Value>,
}

impl Filter {
    fn visible() -> Self {
        Self {
            clauses: vec!["deleted = 0".to_string()],
            values: Vec::new(),
        }
    }

    fn push(mut self, clause: &str, value: Value) -> Self {
        self.clauses.push(clause.to_string());
        self.values.push(value);
        self
    }

    fn languages(mut self, languages: &[String]) -> Self {
        if !languages.is_empty() {
            let placeholders = vec!["?"; languages.len()].join(", ");
            self.clauses.push(format!("language IN ({})", placeholders));
            self.values
                .extend(languages.iter().map(|l| Value::Text(l.clone())));
        }
        self
    }

    fn published_since(self, window_days: i64) -> Self {
        let cutoff = (Utc::now() - Duration::days(window_days)).timestamp_millis();
        self.push("published_at >= ?", Value::Integer(cutoff))
    }

    fn sql(&self) -> String {
        self.clauses.join(" AND ")
    }
}

/// Escape `LIKE` wildcards in a search token
fn like_pattern(token: &str) -> String {
    let escaped = token
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl SqliteNewsStore {
    /// Open (or create) the database at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Io(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path.as_ref())?;
        let store = Self {
            conn: Mutex::new(conn),
            zone: newsfeed_core::DEFAULT_REFERENCE_ZONE,
        };
        store.init_schema()?;

        info!("[Store] Opened SQLite store at {}", db_path.as_ref().display());
        Ok(store)
    }

    /// In-memory database for tests
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            zone: newsfeed_core::DEFAULT_REFERENCE_ZONE,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Zone used to day-bucket the vote and view rankings
    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                link TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                summary TEXT NOT NULL DEFAULT '',
                published_at INTEGER NOT NULL,
                votes INTEGER NOT NULL DEFAULT 0,
                views INTEGER NOT NULL DEFAULT 0,
                language TEXT NOT NULL,
                domain TEXT,
                deleted INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_entries_published
            ON entries(published_at DESC);

            CREATE INDEX IF NOT EXISTS idx_entries_language
            ON entries(language, published_at DESC);

            CREATE INDEX IF NOT EXISTS idx_entries_domain
            ON entries(domain, published_at DESC);
            "#,
        )?;

        Ok(())
    }

    fn query_entries(
        &self,
        filter: Filter,
        order_and_limit: &str,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let rows = {
            let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
            let sql = format!(
                "SELECT {} FROM entries WHERE {} {}",
                ENTRY_COLUMNS,
                filter.sql(),
                order_and_limit
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(filter.values.iter()), EntryRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    fn newest(&self, filter: Filter, limit: usize) -> Result<Vec<NewsEntry>, StoreError> {
        self.query_entries(
            filter,
            &format!("ORDER BY published_at DESC LIMIT {}", limit),
        )
    }
}

#[async_trait]
impl NewsStore for SqliteNewsStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn exists(&self, link: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let found = conn
            .query_row(
                "SELECT 1 FROM entries WHERE link = ?1",
                params![link],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn save(&self, entry: &NewsEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let result = conn.execute(
            r#"
            INSERT INTO entries
                (link, title, content, summary, published_at, votes, views, language, domain, deleted)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                entry.link(),
                entry.title,
                entry.content,
                entry.summary,
                entry.published_at().timestamp_millis(),
                entry.votes,
                entry.views,
                entry.language,
                entry.domain_only().map(|d| d.to_lowercase()),
                entry.is_deleted() as i64,
            ],
        );

        match result {
            Ok(_) => {
                debug!("Saved {}", entry.link());
                Ok(())
            }
            Err(e) if is_constraint_violation(&e) => {
                Err(StoreError::Duplicate(entry.link().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, entry: &NewsEntry) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let changed = conn.execute(
            r#"
            UPDATE entries
            SET title = ?2, content = ?3, summary = ?4, published_at = ?5,
                votes = ?6, views = ?7, language = ?8, deleted = ?9
            WHERE link = ?1
            "#,
            params![
                entry.link(),
                entry.title,
                entry.content,
                entry.summary,
                entry.published_at().timestamp_millis(),
                entry.votes,
                entry.views,
                entry.language,
                entry.is_deleted() as i64,
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(entry.link().to_string()));
        }
        Ok(())
    }

    async fn find_by_link(&self, link: &str) -> Result<Option<NewsEntry>, StoreError> {
        let row = {
            let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
            conn.query_row(
                &format!("SELECT {} FROM entries WHERE link = ?1", ENTRY_COLUMNS),
                params![link],
                EntryRow::from_row,
            )
            .optional()?
        };
        row.map(EntryRow::into_entry).transpose()
    }

    async fn find_recent(
        &self,
        languages: &[String],
        window_days: i64,
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let filter = Filter::visible()
            .languages(languages)
            .published_since(window_days);
        self.newest(filter, limit)
    }

    async fn find_by_votes(
        &self,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        // Day bucketing depends on the zone, so rank in Rust
        let filter = Filter::visible()
            .languages(languages)
            .push("votes >= ?", Value::Integer(1));
        let mut entries = self.query_entries(filter, "")?;
        rank_by_votes(&mut entries, self.zone);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn find_by_views(
        &self,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let filter = Filter::visible()
            .languages(languages)
            .push("views >= ?", Value::Integer(1));
        let mut entries = self.query_entries(filter, "")?;
        rank_by_views(&mut entries, self.zone);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn find_by_site(
        &self,
        domain: &str,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let domain = domain.trim().trim_start_matches("www.").to_lowercase();
        let filter = Filter::visible()
            .push("domain = ?", Value::Text(domain))
            .languages(languages);
        self.newest(filter, limit)
    }

    async fn search_titles(
        &self,
        query: &str,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let tokens = search_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        // LIKE folds ASCII case only
        let filter = tokens
            .iter()
            .fold(Filter::visible().languages(languages), |filter, token| {
                filter.push("title LIKE ? ESCAPE '\\'", Value::Text(like_pattern(token)))
            });
        self.newest(filter, limit)
    }

    async fn find_unsummarized(
        &self,
        window_days: i64,
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let mut filter = Filter::visible().published_since(window_days);
        filter.clauses.push("TRIM(summary) = ''".to_string());
        self.newest(filter, limit)
    }

    async fn recent_links(
        &self,
        window_days: i64,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let filter = Filter::visible().published_since(window_days);
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let sql = format!(
            "SELECT link FROM entries WHERE {} ORDER BY published_at DESC LIMIT {}",
            filter.sql(),
            limit
        );
        let mut stmt = conn.prepare(&sql)?;
        let links = stmt
            .query_map(params_from_iter(filter.values.iter()), |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(links)
    }

    async fn watch(&self) -> Result<ChangeStream, StoreError> {
        Err(StoreError::ChangeStreamUnsupported(
            "sqlite has no change feed".to_string(),
        ))
    }
}
