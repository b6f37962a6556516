//! Storage - SQLite backend
//!
//! One file per store (project or global). Uses SQLite with FTS5 over
//! content items for lexical recall.
//!
//! # Key Points
//! - Facts are never deleted; retirement is a status change plus a link
//! - Every multi-statement sequence runs inside one transaction:
//!   [`Storage::read`] is deferred, [`Storage::write`] is `BEGIN IMMEDIATE`
//!   so a slot read and the writes decided from it cannot interleave with
//!   another writer
//! - Each executed statement bumps a counter ([`Storage::query_count`])

use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, CachedStatement, Connection, OpenFlags, OptionalExtension,
    Transaction, TransactionBehavior,
};
use serde::Serialize;
use tracing::debug;
use ulid::Ulid;

use super::embedding::{decode_vector, encode_vector};
use super::error::{Error, Result};
use super::fact::{
    Conflict, ConflictStatus, EntityKey, Fact, FactBundle, FactLink, Provenance, Scope,
    ScopeContext, Status,
};
use super::resolver::{ConflictWrite, ContentRef, Dispute, NewFact, SlotKey, SlotState, WriteSet};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// SQL list of the statuses recall returns; kept in step with `Status::CURRENT`.
const CURRENT_STATUSES: &str = "'active', 'disputed', 'proposed'";

const FACT_COLUMNS: &str = "f.id, f.subject_entity_id, e.canonical_name, e.entity_type, \
     f.predicate, f.object_literal, f.object_entity_id, f.polarity, f.confidence, f.status, \
     f.scope, f.project_path, f.valid_from, f.valid_to, f.created_at";

const FACT_FROM: &str = "facts f LEFT JOIN entities e ON e.id = f.subject_entity_id";

const CONFLICT_COLUMNS: &str =
    "c.id, c.fact_a_id, c.fact_b_id, c.status, c.notes, c.detected_at, c.resolved_at";

const RECEIPT_COLUMNS: &str = "id, fact_id, content_item_id, quote, strength, created_at";

/// Restricts reads to one logical source.
///
/// In dual mode each file holds one scope and the filter is redundant; in
/// single mode it is what keeps project and global rows apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeFilter {
    pub scope: Scope,
    pub project_path: Option<String>,
}

impl ScopeFilter {
    pub fn project(path: impl Into<String>) -> Self {
        Self {
            scope: Scope::Project,
            project_path: Some(path.into()),
        }
    }

    pub fn global() -> Self {
        Self {
            scope: Scope::Global,
            project_path: None,
        }
    }

    /// Filter for `scope` under `ctx`; project scope needs a project path.
    pub fn for_scope(scope: Scope, ctx: &ScopeContext) -> Result<Self> {
        Ok(Self {
            scope,
            project_path: ctx.project_path_for(scope)?,
        })
    }

    /// Bound as `?1` (scope) and `?2` (project path or NULL).
    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.scope.as_str().to_string()),
            match &self.project_path {
                Some(path) => Value::Text(path.clone()),
                None => Value::Null,
            },
        ]
    }
}

const SCOPE_CLAUSE: &str = "f.scope = ?1 AND (?2 IS NULL OR f.project_path = ?2)";

/// Raw source text that provenance points into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: Ulid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Database storage
pub struct Storage {
    conn: Connection,
    path: Option<PathBuf>,
    queries: Cell<u64>,
}

impl Storage {
    /// Open or create a database
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // WAL lets readers proceed while a writer holds the slot
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(busy_timeout)?;

        let storage = Self {
            conn,
            path: Some(path.to_path_buf()),
            queries: Cell::new(0),
        };
        storage.init_schema()?;
        debug!(path = %path.display(), "opened store");

        Ok(storage)
    }

    /// Open an in-memory database
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self {
            conn,
            path: None,
            queries: Cell::new(0),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Statements executed through [`Txn`] since open.
    pub fn query_count(&self) -> u64 {
        self.queries.get()
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                canonical_name TEXT NOT NULL,
                slug TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (entity_type, slug)
            );

            CREATE TABLE IF NOT EXISTS content_items (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- FTS5 over content bodies (external content)
            CREATE VIRTUAL TABLE IF NOT EXISTS content_fts USING fts5(
                body,
                content='content_items',
                content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS content_items_ai AFTER INSERT ON content_items BEGIN
                INSERT INTO content_fts(rowid, body) VALUES (new.rowid, new.body);
            END;

            CREATE TABLE IF NOT EXISTS facts (
                id TEXT PRIMARY KEY,
                subject_entity_id TEXT REFERENCES entities(id),
                predicate TEXT NOT NULL,
                object_literal TEXT NOT NULL,
                object_entity_id TEXT REFERENCES entities(id),
                polarity TEXT NOT NULL DEFAULT 'positive',
                confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
                status TEXT NOT NULL DEFAULT 'active',
                scope TEXT NOT NULL,
                project_path TEXT,
                valid_from TEXT NOT NULL,
                valid_to TEXT,
                created_at TEXT NOT NULL,
                CHECK ((scope = 'project') = (project_path IS NOT NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_facts_slot
                ON facts(subject_entity_id, predicate, scope, project_path, status);
            CREATE INDEX IF NOT EXISTS idx_facts_created ON facts(created_at);

            CREATE TABLE IF NOT EXISTS provenance (
                id TEXT PRIMARY KEY,
                fact_id TEXT NOT NULL REFERENCES facts(id),
                content_item_id TEXT NOT NULL REFERENCES content_items(id),
                quote TEXT NOT NULL,
                strength TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_provenance_fact ON provenance(fact_id);
            CREATE INDEX IF NOT EXISTS idx_provenance_content ON provenance(content_item_id);

            CREATE TABLE IF NOT EXISTS fact_links (
                from_fact_id TEXT NOT NULL REFERENCES facts(id),
                to_fact_id TEXT NOT NULL REFERENCES facts(id),
                link_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (from_fact_id, to_fact_id, link_type)
            );

            CREATE INDEX IF NOT EXISTS idx_links_to ON fact_links(to_fact_id);

            CREATE TABLE IF NOT EXISTS conflicts (
                id TEXT PRIMARY KEY,
                fact_a_id TEXT NOT NULL REFERENCES facts(id),
                fact_b_id TEXT NOT NULL REFERENCES facts(id),
                status TEXT NOT NULL DEFAULT 'open',
                notes TEXT,
                detected_at TEXT NOT NULL,
                resolved_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_conflicts_a ON conflicts(fact_a_id, status);
            CREATE INDEX IF NOT EXISTS idx_conflicts_b ON conflicts(fact_b_id);

            CREATE TABLE IF NOT EXISTS fact_embeddings (
                fact_id TEXT PRIMARY KEY REFERENCES facts(id),
                dim INTEGER NOT NULL,
                vector BLOB NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Run `f` inside one deferred (read) transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Txn<'_>) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let out = f(&Txn {
            conn: &tx,
            queries: &self.queries,
        })?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken up front, so anything `f` reads stays valid
    /// until commit. An error from `f` rolls everything back.
    pub fn write<T>(&self, f: impl FnOnce(&Txn<'_>) -> Result<T>) -> Result<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(&Txn {
            conn: &tx,
            queries: &self.queries,
        })?;
        tx.commit()?;
        Ok(out)
    }

    /// Store raw text for later extraction and lexical recall.
    pub fn add_content(&self, body: &str, now: DateTime<Utc>) -> Result<Ulid> {
        let item = ContentItem {
            id: Ulid::new(),
            body: body.to_string(),
            created_at: now,
        };
        self.write(|tx| tx.insert_content(&item))?;
        Ok(item.id)
    }

    /// Get database statistics
    pub fn stats(&self, filter: &ScopeFilter) -> Result<StorageStats> {
        self.read(|tx| tx.stats(filter))
    }
}

/// Statement runner bound to one open transaction.
pub struct Txn<'a> {
    conn: &'a Connection,
    queries: &'a Cell<u64>,
}

impl<'a> Txn<'a> {
    fn prepare(&self, sql: &str) -> Result<CachedStatement<'a>> {
        self.queries.set(self.queries.get() + 1);
        Ok(self.conn.prepare_cached(sql)?)
    }

    fn execute(&self, sql: &str, params: impl rusqlite::Params) -> Result<usize> {
        self.queries.set(self.queries.get() + 1);
        Ok(self.conn.execute(sql, params)?)
    }

    // ---- content -------------------------------------------------------

    pub fn insert_content(&self, item: &ContentItem) -> Result<()> {
        self.execute(
            "INSERT OR IGNORE INTO content_items (id, body, created_at) VALUES (?1, ?2, ?3)",
            params![item.id.to_string(), item.body, fmt_time(&item.created_at)],
        )?;
        Ok(())
    }

    pub fn content_exists(&self, id: &Ulid) -> Result<bool> {
        let mut stmt = self.prepare("SELECT 1 FROM content_items WHERE id = ?1")?;
        Ok(stmt.exists([id.to_string()])?)
    }

    pub fn content_items(&self, ids: &[Ulid]) -> Result<Vec<ContentItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, body, created_at FROM content_items WHERE id IN ({})",
            placeholders(1, ids.len())
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(id_values(ids)), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut by_id = HashMap::new();
        for (id, body, created_at) in rows {
            let item = ContentItem {
                id: parse_ulid(&id)?,
                body,
                created_at: parse_time(&created_at)?,
            };
            by_id.insert(item.id, item);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Escape and prepare query for FTS5
    ///
    /// Each word is quoted (hyphens and other operators are literal) and the
    /// words are joined with OR, so any matching word returns results.
    fn escape_fts_query(query: &str) -> String {
        query
            .split_whitespace()
            .map(|w| format!("\"{}\"", w.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// Content item ids matching `text` and cited by a current fact in
    /// `filter`, best match first.
    ///
    /// The scope test runs before `LIMIT`, so text cited only by other
    /// projects never takes up the window. Ties on bm25 fall back to
    /// insertion order so results are stable.
    pub fn search_content(
        &self,
        text: &str,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<Ulid>> {
        let fts_query = Self::escape_fts_query(text);
        if fts_query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT c.id
            FROM content_fts
            JOIN content_items c ON c.rowid = content_fts.rowid
            WHERE content_fts MATCH ?3
              AND EXISTS (
                SELECT 1 FROM provenance p
                JOIN facts f ON f.id = p.fact_id
                WHERE p.content_item_id = c.id
                  AND {SCOPE_CLAUSE}
                  AND f.status IN ({CURRENT_STATUSES})
              )
            ORDER BY bm25(content_fts), c.rowid
            LIMIT ?4
            "#
        );
        let mut values = filter.values();
        values.push(Value::Text(fts_query));
        values.push(Value::Integer(limit as i64));

        let mut stmt = self.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(values), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        ids.iter().map(|id| parse_ulid(id)).collect()
    }

    /// `(content_item_id, fact_id)` pairs for current facts in `filter`
    /// citing any of `content_ids`, oldest receipt first.
    pub fn facts_for_content(
        &self,
        content_ids: &[Ulid],
        filter: &ScopeFilter,
    ) -> Result<Vec<(Ulid, Ulid)>> {
        if content_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT p.content_item_id, p.fact_id
            FROM provenance p
            JOIN facts f ON f.id = p.fact_id
            WHERE {SCOPE_CLAUSE}
              AND f.status IN ({CURRENT_STATUSES})
              AND p.content_item_id IN ({})
            ORDER BY p.created_at, p.id
            "#,
            placeholders(3, content_ids.len())
        );
        let mut values = filter.values();
        values.extend(id_values(content_ids));

        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|(content, fact)| Ok((parse_ulid(content)?, parse_ulid(fact)?)))
            .collect()
    }

    // ---- facts ---------------------------------------------------------

    /// Facts by id, in the order of `ids`; unknown ids are skipped.
    pub fn load_facts(&self, ids: &[Ulid]) -> Result<Vec<Fact>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM {FACT_FROM} WHERE f.id IN ({})",
            placeholders(1, ids.len())
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(id_values(ids)), |row| FactRow::read(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut by_id = HashMap::with_capacity(rows.len());
        for row in rows {
            let fact = row.into_fact()?;
            by_id.insert(fact.id, fact);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Receipts for all `fact_ids`, oldest first.
    pub fn load_receipts(&self, fact_ids: &[Ulid]) -> Result<Vec<Provenance>> {
        if fact_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {RECEIPT_COLUMNS} FROM provenance WHERE fact_id IN ({}) ORDER BY created_at, id",
            placeholders(1, fact_ids.len())
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(id_values(fact_ids)), ReceiptRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ReceiptRow::into_receipt).collect()
    }

    /// Facts plus receipts in two statements, in the order of `ids`.
    pub fn load_bundles(&self, ids: &[Ulid]) -> Result<Vec<FactBundle>> {
        let facts = self.load_facts(ids)?;
        let mut receipts: HashMap<Ulid, Vec<Provenance>> = HashMap::new();
        for receipt in self.load_receipts(ids)? {
            receipts.entry(receipt.fact_id).or_default().push(receipt);
        }
        Ok(facts
            .into_iter()
            .map(|fact| FactBundle {
                receipts: receipts.remove(&fact.id).unwrap_or_default(),
                fact,
            })
            .collect())
    }

    pub fn get_fact(&self, id: &Ulid, filter: &ScopeFilter) -> Result<Option<Fact>> {
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM {FACT_FROM} WHERE {SCOPE_CLAUSE} AND f.id = ?3"
        );
        let mut values = filter.values();
        values.push(Value::Text(id.to_string()));

        let mut stmt = self.prepare(&sql)?;
        let row = stmt
            .query_row(params_from_iter(values), |row| FactRow::read(row, 0))
            .optional()?;
        row.map(FactRow::into_fact).transpose()
    }

    /// Current facts with stored embeddings, newest first, at most `cap`.
    pub fn embedding_candidates(
        &self,
        filter: &ScopeFilter,
        cap: usize,
    ) -> Result<Vec<(Ulid, Vec<f32>)>> {
        let sql = format!(
            r#"
            SELECT v.fact_id, v.vector
            FROM fact_embeddings v
            JOIN facts f ON f.id = v.fact_id
            WHERE {SCOPE_CLAUSE} AND f.status IN ({CURRENT_STATUSES})
            ORDER BY f.created_at DESC, f.id DESC
            LIMIT ?3
            "#
        );
        let mut values = filter.values();
        values.push(Value::Integer(cap as i64));

        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|(id, blob)| Ok((parse_ulid(id)?, decode_vector(blob)?)))
            .collect()
    }

    /// Facts in `filter` created after `since` (all when `None`), newest first.
    pub fn changes_since(
        &self,
        filter: &ScopeFilter,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Fact>> {
        let sql = format!(
            r#"
            SELECT {FACT_COLUMNS} FROM {FACT_FROM}
            WHERE {SCOPE_CLAUSE} AND (?3 IS NULL OR f.created_at > ?3)
            ORDER BY f.created_at DESC, f.id DESC
            LIMIT ?4
            "#
        );
        let mut values = filter.values();
        values.push(match since {
            Some(ts) => Value::Text(fmt_time(&ts)),
            None => Value::Null,
        });
        values.push(Value::Integer(limit as i64));

        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| FactRow::read(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(FactRow::into_fact).collect()
    }

    // ---- history walks -------------------------------------------------

    pub fn receipts_for(&self, fact_id: &Ulid, limit: usize) -> Result<Vec<Provenance>> {
        let sql = format!(
            "SELECT {RECEIPT_COLUMNS} FROM provenance WHERE fact_id = ?1 ORDER BY created_at, id LIMIT ?2"
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params![fact_id.to_string(), limit as i64], ReceiptRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ReceiptRow::into_receipt).collect()
    }

    /// Facts that `fact_id` replaced.
    pub fn superseded_facts(&self, fact_id: &Ulid, limit: usize) -> Result<Vec<Fact>> {
        self.link_walk("to_fact_id", "from_fact_id", fact_id, limit)
    }

    /// Facts that replaced `fact_id`.
    pub fn superseding_facts(&self, fact_id: &Ulid, limit: usize) -> Result<Vec<Fact>> {
        self.link_walk("from_fact_id", "to_fact_id", fact_id, limit)
    }

    /// Follow `supersedes` links one hop: `known` holds `fact_id`, `other` is returned.
    fn link_walk(
        &self,
        other: &str,
        known: &str,
        fact_id: &Ulid,
        limit: usize,
    ) -> Result<Vec<Fact>> {
        let sql = format!(
            r#"
            SELECT {FACT_COLUMNS}
            FROM fact_links l
            JOIN facts f ON f.id = l.{other}
            LEFT JOIN entities e ON e.id = f.subject_entity_id
            WHERE l.{known} = ?1 AND l.link_type = 'supersedes'
            ORDER BY l.created_at DESC
            LIMIT ?2
            "#
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params![fact_id.to_string(), limit as i64], |row| {
                FactRow::read(row, 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(FactRow::into_fact).collect()
    }

    /// Conflicts (open or resolved) that `fact_id` takes part in, newest first.
    pub fn conflicts_for(&self, fact_id: &Ulid, limit: usize) -> Result<Vec<Conflict>> {
        let sql = format!(
            r#"
            SELECT {CONFLICT_COLUMNS} FROM conflicts c
            WHERE c.fact_a_id = ?1 OR c.fact_b_id = ?1
            ORDER BY c.detected_at DESC, c.id DESC
            LIMIT ?2
            "#
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params![fact_id.to_string(), limit as i64], |row| {
                ConflictRow::read(row, 0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ConflictRow::into_conflict).collect()
    }

    /// Open conflicts whose slot holder lies in `filter`, newest first.
    pub fn open_conflicts(&self, filter: &ScopeFilter) -> Result<Vec<Conflict>> {
        let sql = format!(
            r#"
            SELECT {CONFLICT_COLUMNS} FROM conflicts c
            JOIN facts f ON f.id = c.fact_a_id
            WHERE {SCOPE_CLAUSE} AND c.status = 'open'
            ORDER BY c.detected_at DESC, c.id DESC
            "#
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(filter.values()), |row| ConflictRow::read(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ConflictRow::into_conflict).collect()
    }

    // ---- slots ---------------------------------------------------------

    pub fn find_entity(&self, key: &EntityKey) -> Result<Option<Ulid>> {
        let mut stmt =
            self.prepare("SELECT id FROM entities WHERE entity_type = ?1 AND slug = ?2")?;
        let id = stmt
            .query_row(params![key.entity_type, key.slug()], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        id.map(|id| parse_ulid(&id)).transpose()
    }

    /// Active and proposed facts of the slot (newest first) and the open
    /// conflicts against its current holder.
    pub fn slot_state(&self, slot: &SlotKey) -> Result<SlotState> {
        let subject_id = match &slot.subject {
            Some(key) => match self.find_entity(key)? {
                Some(id) => Some(id.to_string()),
                // No entity yet, so nothing can occupy the slot
                None => return Ok(SlotState::default()),
            },
            None => None,
        };

        let sql = format!(
            r#"
            SELECT {FACT_COLUMNS} FROM {FACT_FROM}
            WHERE f.subject_entity_id IS ?1 AND f.predicate = ?2
              AND f.scope = ?3 AND f.project_path IS ?4
              AND f.status IN ('active', 'proposed')
            ORDER BY f.created_at DESC, f.id DESC
            "#
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![
                    subject_id,
                    slot.predicate,
                    slot.scope.as_str(),
                    slot.project_path
                ],
                |row| FactRow::read(row, 0),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        let (active, proposed): (Vec<Fact>, Vec<Fact>) = rows
            .into_iter()
            .map(FactRow::into_fact)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .partition(|f| f.status == Status::Active);

        let disputes = match active.first() {
            Some(current) => self.disputes_against(&current.id)?,
            None => Vec::new(),
        };

        Ok(SlotState {
            active,
            proposed,
            disputes,
        })
    }

    fn disputes_against(&self, fact_id: &Ulid) -> Result<Vec<Dispute>> {
        let sql = format!(
            r#"
            SELECT {CONFLICT_COLUMNS}, {FACT_COLUMNS}
            FROM conflicts c
            JOIN facts f ON f.id = c.fact_b_id
            LEFT JOIN entities e ON e.id = f.subject_entity_id
            WHERE c.fact_a_id = ?1 AND c.status = 'open'
            ORDER BY c.detected_at DESC, c.id DESC
            "#
        );
        let mut stmt = self.prepare(&sql)?;
        let rows = stmt
            .query_map([fact_id.to_string()], |row| {
                Ok((ConflictRow::read(row, 0)?, FactRow::read(row, 7)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(conflict, disputed)| {
                Ok(Dispute {
                    conflict: conflict.into_conflict()?,
                    disputed: disputed.into_fact()?,
                })
            })
            .collect()
    }

    // ---- writes --------------------------------------------------------

    /// Id of the entity for `key`, creating it on first use.
    pub fn upsert_entity(&self, key: &EntityKey, now: DateTime<Utc>) -> Result<Ulid> {
        self.execute(
            r#"
            INSERT INTO entities (id, entity_type, canonical_name, slug, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (entity_type, slug) DO NOTHING
            "#,
            params![
                Ulid::new().to_string(),
                key.entity_type,
                key.name.trim(),
                key.slug(),
                fmt_time(&now)
            ],
        )?;
        self.find_entity(key)?
            .ok_or_else(|| Error::Decode(format!("entity {}/{} vanished", key.entity_type, key.name)))
    }

    fn insert_fact(&self, new_fact: &NewFact) -> Result<()> {
        let fact = &new_fact.fact;
        let subject_id = match &new_fact.subject_key {
            Some(key) => Some(self.upsert_entity(key, fact.created_at)?),
            None => None,
        };
        let object_id = match &new_fact.object_key {
            Some(key) => Some(self.upsert_entity(key, fact.created_at)?),
            None => None,
        };

        self.execute(
            r#"
            INSERT INTO facts (
                id, subject_entity_id, predicate, object_literal, object_entity_id,
                polarity, confidence, status, scope, project_path,
                valid_from, valid_to, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                fact.id.to_string(),
                subject_id.map(|id| id.to_string()),
                fact.predicate,
                fact.object_literal,
                object_id.map(|id| id.to_string()),
                fact.polarity.as_str(),
                fact.confidence as f64,
                fact.status.as_str(),
                fact.scope.as_str(),
                fact.project_path,
                fmt_time(&fact.valid_from),
                fact.valid_to.as_ref().map(fmt_time),
                fmt_time(&fact.created_at),
            ],
        )?;

        if let Some(vector) = &new_fact.embedding {
            self.execute(
                "INSERT OR REPLACE INTO fact_embeddings (fact_id, dim, vector) VALUES (?1, ?2, ?3)",
                params![fact.id.to_string(), vector.len() as i64, encode_vector(vector)],
            )?;
        }
        Ok(())
    }

    pub fn insert_receipt(&self, receipt: &Provenance) -> Result<()> {
        self.execute(
            &format!("INSERT INTO provenance ({RECEIPT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                receipt.id.to_string(),
                receipt.fact_id.to_string(),
                receipt.content_item_id.to_string(),
                receipt.quote,
                receipt.strength.as_str(),
                fmt_time(&receipt.created_at),
            ],
        )?;
        Ok(())
    }

    fn insert_link(&self, link: &FactLink) -> Result<()> {
        self.execute(
            r#"
            INSERT OR IGNORE INTO fact_links (from_fact_id, to_fact_id, link_type, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                link.from_fact_id.to_string(),
                link.to_fact_id.to_string(),
                link.link_type.as_str(),
                fmt_time(&link.created_at),
            ],
        )?;
        Ok(())
    }

    fn write_conflict(&self, conflict: &ConflictWrite) -> Result<()> {
        match conflict {
            ConflictWrite::Open(c) => {
                self.execute(
                    r#"
                    INSERT INTO conflicts (
                        id, fact_a_id, fact_b_id, status, notes, detected_at, resolved_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        c.id.to_string(),
                        c.fact_a_id.to_string(),
                        c.fact_b_id.to_string(),
                        c.status.as_str(),
                        c.notes,
                        fmt_time(&c.detected_at),
                        c.resolved_at.as_ref().map(fmt_time),
                    ],
                )?;
            }
            ConflictWrite::Refresh {
                conflict_id,
                detected_at,
                notes,
            } => {
                self.execute(
                    "UPDATE conflicts SET detected_at = ?2, notes = ?3 WHERE id = ?1",
                    params![conflict_id.to_string(), fmt_time(detected_at), notes],
                )?;
            }
        }
        Ok(())
    }

    /// Apply a resolver decision. Must run inside [`Storage::write`].
    pub fn apply(&self, ws: &WriteSet) -> Result<()> {
        let receipt = &ws.receipt;
        match &receipt.content {
            ContentRef::Existing(id) => {
                if !self.content_exists(id)? {
                    return Err(Error::validation(format!("unknown content item {id}")));
                }
            }
            ContentRef::Inline { id, body } => self.insert_content(&ContentItem {
                id: *id,
                body: body.clone(),
                created_at: receipt.created_at,
            })?,
        }

        if let Some(new_fact) = &ws.new_fact {
            self.insert_fact(new_fact)?;
        }

        if let Some(retire) = &ws.retire {
            self.execute(
                "UPDATE facts SET status = ?2, valid_to = ?3 WHERE id = ?1",
                params![
                    retire.fact_id.to_string(),
                    retire.status.as_str(),
                    fmt_time(&retire.valid_to)
                ],
            )?;
        }

        if let Some(fact_id) = &ws.activate {
            self.execute(
                "UPDATE facts SET status = 'active', valid_to = NULL WHERE id = ?1",
                [fact_id.to_string()],
            )?;
        }

        if let Some(link) = &ws.link {
            self.insert_link(link)?;
        }

        // Same clock as the rest of the write-set
        let resolved_at = fmt_time(&receipt.created_at);
        for conflict_id in &ws.resolve_conflicts {
            self.execute(
                "UPDATE conflicts SET status = 'resolved', resolved_at = ?2 WHERE id = ?1 AND status = 'open'",
                params![conflict_id.to_string(), resolved_at],
            )?;
        }

        if let Some(conflict) = &ws.conflict {
            self.write_conflict(conflict)?;
        }

        self.insert_receipt(&Provenance {
            id: receipt.id,
            fact_id: ws.fact_id,
            content_item_id: receipt.content.id(),
            quote: receipt.quote.clone(),
            strength: receipt.strength,
            created_at: receipt.created_at,
        })
    }

    // ---- stats ---------------------------------------------------------

    pub fn stats(&self, filter: &ScopeFilter) -> Result<StorageStats> {
        let sql = format!(
            "SELECT f.status, COUNT(*) FROM facts f WHERE {SCOPE_CLAUSE} GROUP BY f.status"
        );
        let mut stmt = self.prepare(&sql)?;
        let by_status = stmt
            .query_map(params_from_iter(filter.values()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stats = StorageStats::default();
        for (status, count) in by_status {
            let count = count as usize;
            stats.total_facts += count;
            match status.as_str() {
                "active" => stats.active_facts = count,
                "disputed" => stats.disputed_facts = count,
                "proposed" => stats.proposed_facts = count,
                _ => stats.retired_facts += count,
            }
        }
        stats.open_conflicts = self.open_conflicts(filter)?.len();
        Ok(stats)
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    pub total_facts: usize,
    pub active_facts: usize,
    pub disputed_facts: usize,
    pub proposed_facts: usize,
    /// Superseded or expired
    pub retired_facts: usize,
    pub open_conflicts: usize,
}

// ---- row decoding --------------------------------------------------------

struct FactRow {
    id: String,
    subject_entity_id: Option<String>,
    subject: Option<String>,
    subject_type: Option<String>,
    predicate: String,
    object_literal: String,
    object_entity_id: Option<String>,
    polarity: String,
    confidence: f64,
    status: String,
    scope: String,
    project_path: Option<String>,
    valid_from: String,
    valid_to: Option<String>,
    created_at: String,
}

impl FactRow {
    /// Read [`FACT_COLUMNS`] starting at column `at`.
    fn read(row: &rusqlite::Row, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            subject_entity_id: row.get(at + 1)?,
            subject: row.get(at + 2)?,
            subject_type: row.get(at + 3)?,
            predicate: row.get(at + 4)?,
            object_literal: row.get(at + 5)?,
            object_entity_id: row.get(at + 6)?,
            polarity: row.get(at + 7)?,
            confidence: row.get(at + 8)?,
            status: row.get(at + 9)?,
            scope: row.get(at + 10)?,
            project_path: row.get(at + 11)?,
            valid_from: row.get(at + 12)?,
            valid_to: row.get(at + 13)?,
            created_at: row.get(at + 14)?,
        })
    }

    fn into_fact(self) -> Result<Fact> {
        Ok(Fact {
            id: parse_ulid(&self.id)?,
            subject_entity_id: self.subject_entity_id.as_deref().map(parse_ulid).transpose()?,
            subject: self.subject,
            subject_type: self.subject_type,
            predicate: self.predicate,
            object_literal: self.object_literal,
            object_entity_id: self.object_entity_id.as_deref().map(parse_ulid).transpose()?,
            polarity: self.polarity.parse()?,
            confidence: self.confidence as f32,
            status: self.status.parse()?,
            scope: self
                .scope
                .parse()
                .map_err(|_| Error::Decode(format!("unknown scope: {}", self.scope)))?,
            project_path: self.project_path,
            valid_from: parse_time(&self.valid_from)?,
            valid_to: self.valid_to.as_deref().map(parse_time).transpose()?,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

struct ReceiptRow {
    id: String,
    fact_id: String,
    content_item_id: String,
    quote: String,
    strength: String,
    created_at: String,
}

impl ReceiptRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            fact_id: row.get(1)?,
            content_item_id: row.get(2)?,
            quote: row.get(3)?,
            strength: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_receipt(self) -> Result<Provenance> {
        Ok(Provenance {
            id: parse_ulid(&self.id)?,
            fact_id: parse_ulid(&self.fact_id)?,
            content_item_id: parse_ulid(&self.content_item_id)?,
            quote: self.quote,
            strength: self.strength.parse()?,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

struct ConflictRow {
    id: String,
    fact_a_id: String,
    fact_b_id: String,
    status: String,
    notes: Option<String>,
    detected_at: String,
    resolved_at: Option<String>,
}

impl ConflictRow {
    fn read(row: &rusqlite::Row, at: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(at)?,
            fact_a_id: row.get(at + 1)?,
            fact_b_id: row.get(at + 2)?,
            status: row.get(at + 3)?,
            notes: row.get(at + 4)?,
            detected_at: row.get(at + 5)?,
            resolved_at: row.get(at + 6)?,
        })
    }

    fn into_conflict(self) -> Result<Conflict> {
        Ok(Conflict {
            id: parse_ulid(&self.id)?,
            fact_a_id: parse_ulid(&self.fact_a_id)?,
            fact_b_id: parse_ulid(&self.fact_b_id)?,
            status: self.status.parse::<ConflictStatus>()?,
            notes: self.notes,
            detected_at: parse_time(&self.detected_at)?,
            resolved_at: self.resolved_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

/// Fixed-width UTC timestamps so text order is time order.
fn fmt_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Decode(format!("bad timestamp {s:?}: {e}")))
}

fn parse_ulid(s: &str) -> Result<Ulid> {
    Ulid::from_string(s).map_err(|e| Error::Decode(format!("bad id {s:?}: {e}")))
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn id_values(ids: &[Ulid]) -> impl Iterator<Item = Value> + '_ {
    ids.iter().map(|id| Value::Text(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fact::{now, Status};
    use crate::core::resolver::{Action, Candidate, Resolver};

    fn resolve(storage: &Storage, candidate: Candidate, ctx: &ScopeContext) -> Result<WriteSet> {
        let resolver = Resolver::default();
        let slot = SlotKey::for_candidate(&candidate, ctx)?;
        storage.write(|tx| {
            let state = tx.slot_state(&slot)?;
            let ws = resolver.decide(&candidate, &slot, &state, now())?;
            tx.apply(&ws)?;
            Ok(ws)
        })
    }

    fn ctx() -> ScopeContext {
        ScopeContext::new("/work/repo")
    }

    fn db(object: &str) -> Candidate {
        Candidate::new("repo", "uses_database", object).with_quote(format!("we use {object}"))
    }

    #[test]
    fn test_current_statuses_match_enum() {
        let listed: Vec<String> = Status::CURRENT
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect();
        assert_eq!(CURRENT_STATUSES, listed.join(", "));
    }

    #[test]
    fn test_insert_and_load_roundtrip() -> Result<()> {
        let storage = Storage::open_memory()?;
        let ws = resolve(&storage, db("MySQL"), &ctx())?;
        assert_eq!(ws.action, Action::Insert);

        let bundles = storage.read(|tx| tx.load_bundles(&[ws.fact_id]))?;
        assert_eq!(bundles.len(), 1);
        let bundle = &bundles[0];
        assert_eq!(bundle.fact.subject.as_deref(), Some("repo"));
        assert_eq!(bundle.fact.subject_type.as_deref(), Some("concept"));
        assert_eq!(bundle.fact.object_literal, "MySQL");
        assert_eq!(bundle.fact.status, Status::Active);
        assert_eq!(bundle.fact.project_path.as_deref(), Some("/work/repo"));
        assert_eq!(bundle.receipts.len(), 1);
        assert_eq!(bundle.receipts[0].quote, "we use MySQL");
        assert_eq!(bundle.receipts[0].fact_id, ws.fact_id);
        Ok(())
    }

    #[test]
    fn test_timestamps_survive_storage() -> Result<()> {
        let storage = Storage::open_memory()?;
        let ws = resolve(&storage, db("MySQL"), &ctx())?;
        let written = ws.new_fact.map(|n| n.fact.created_at);

        let loaded = storage.read(|tx| tx.get_fact(&ws.fact_id, &ScopeFilter::project("/work/repo")))?;
        assert_eq!(loaded.map(|f| f.created_at), written);
        Ok(())
    }

    #[test]
    fn test_slot_state_tracks_supersession() -> Result<()> {
        let storage = Storage::open_memory()?;
        let first = resolve(&storage, db("MySQL"), &ctx())?;
        let second = resolve(&storage, db("PostgreSQL").with_signal(true), &ctx())?;
        assert_eq!(second.action, Action::Supersede);

        let slot = SlotKey::for_candidate(&db("x"), &ctx())?;
        let state = storage.read(|tx| tx.slot_state(&slot))?;
        assert_eq!(state.active.len(), 1);
        assert_eq!(state.active[0].id, second.fact_id);

        let old = storage.read(|tx| tx.load_facts(&[first.fact_id]))?;
        assert_eq!(old[0].status, Status::Superseded);
        assert!(old[0].valid_to.is_some());

        let replaced = storage.read(|tx| tx.superseded_facts(&second.fact_id, 10))?;
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].id, first.fact_id);
        let replacers = storage.read(|tx| tx.superseding_facts(&first.fact_id, 10))?;
        assert_eq!(replacers[0].id, second.fact_id);
        Ok(())
    }

    #[test]
    fn test_conflict_is_stored_and_refreshed() -> Result<()> {
        let storage = Storage::open_memory()?;
        let holder = resolve(&storage, db("PostgreSQL"), &ctx())?;
        let first = resolve(&storage, db("MongoDB"), &ctx())?;
        assert_eq!(first.action, Action::Conflict);

        let again = resolve(&storage, db("MongoDB"), &ctx())?;
        assert_eq!(again.action, Action::Conflict);
        assert_eq!(again.fact_id, first.fact_id);
        assert_eq!(again.outcome().conflict_id, first.outcome().conflict_id);

        let open = storage.read(|tx| tx.open_conflicts(&ScopeFilter::project("/work/repo")))?;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].fact_a_id, holder.fact_id);
        assert_eq!(open[0].fact_b_id, first.fact_id);

        let receipts = storage.read(|tx| tx.receipts_for(&first.fact_id, 10))?;
        assert_eq!(receipts.len(), 2);
        Ok(())
    }

    #[test]
    fn test_unknown_subject_means_empty_slot() -> Result<()> {
        let storage = Storage::open_memory()?;
        let slot = SlotKey::for_candidate(&db("MySQL"), &ctx())?;
        let state = storage.read(|tx| tx.slot_state(&slot))?;
        assert!(state.active.is_empty());
        assert!(state.disputes.is_empty());
        Ok(())
    }

    #[test]
    fn test_lexical_lookup_respects_scope() -> Result<()> {
        let storage = Storage::open_memory()?;
        resolve(&storage, db("MySQL"), &ctx())?;
        resolve(
            &storage,
            Candidate::new("me", "preference", "tabs").with_quote("I like MySQL with tabs")
                .with_scope(Scope::Global),
            &ctx(),
        )?;

        let lookup = |filter: ScopeFilter| {
            storage.read(|tx| {
                let content = tx.search_content("MySQL", &filter, 10)?;
                let facts = tx.facts_for_content(&content, &filter)?;
                Ok((content.len(), facts.len()))
            })
        };
        assert_eq!(lookup(ScopeFilter::project("/work/repo"))?, (1, 1));
        assert_eq!(lookup(ScopeFilter::global())?, (1, 1));
        assert_eq!(lookup(ScopeFilter::project("/elsewhere"))?, (0, 0));
        Ok(())
    }

    #[test]
    fn test_content_search_limits_after_scoping() -> Result<()> {
        let storage = Storage::open_memory()?;
        let other = ScopeContext::new("/work/other");
        for i in 0..5 {
            let quote = format!("database database database note {i}");
            resolve(
                &storage,
                Candidate::new(format!("svc{i}"), "uses_database", "Redis").with_quote(quote),
                &other,
            )?;
        }
        resolve(&storage, db("MySQL").with_quote("our database is MySQL"), &ctx())?;

        let filter = ScopeFilter::project("/work/repo");
        let content = storage.read(|tx| tx.search_content("database", &filter, 1))?;
        assert_eq!(content.len(), 1);
        let facts = storage.read(|tx| tx.facts_for_content(&content, &filter))?;
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].object_literal, "MySQL");
        Ok(())
    }

    #[test]
    fn test_fts_query_escaping() {
        assert_eq!(Txn::escape_fts_query("fly.io deploy"), "\"fly.io\" OR \"deploy\"");
        assert_eq!(Txn::escape_fts_query("say \"hi\""), "\"say\" OR \"\"\"hi\"\"\"");
        assert_eq!(Txn::escape_fts_query("   "), "");
    }

    #[test]
    fn test_operator_words_are_literal() -> Result<()> {
        let storage = Storage::open_memory()?;
        let content = storage.add_content("use NOT null AND friends", now())?;
        resolve(
            &storage,
            Candidate::new("repo", "convention", "null checks").with_content(content),
            &ctx(),
        )?;
        let filter = ScopeFilter::project("/work/repo");
        let hits = storage.read(|tx| tx.search_content("NOT AND", &filter, 10))?;
        assert_eq!(hits.len(), 1);
        Ok(())
    }

    #[test]
    fn test_unknown_content_item_is_rejected() -> Result<()> {
        let storage = Storage::open_memory()?;
        let err = resolve(
            &storage,
            Candidate::new("repo", "license", "MIT").with_content(Ulid::new()),
            &ctx(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Rolled back: no fact, no entity
        assert_eq!(storage.stats(&ScopeFilter::project("/work/repo"))?.total_facts, 0);
        let key = EntityKey::new("concept", "repo");
        assert_eq!(storage.read(|tx| tx.find_entity(&key))?, None);
        Ok(())
    }

    #[test]
    fn test_changes_since() -> Result<()> {
        let storage = Storage::open_memory()?;
        let a = resolve(&storage, db("MySQL"), &ctx())?;
        let cutoff = storage.read(|tx| tx.load_facts(&[a.fact_id]))?[0].created_at;
        std::thread::sleep(Duration::from_millis(2));
        let b = resolve(&storage, db("PostgreSQL").with_signal(true), &ctx())?;

        let filter = ScopeFilter::project("/work/repo");
        let all = storage.read(|tx| tx.changes_since(&filter, None, 10))?;
        assert_eq!(
            all.iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![b.fact_id, a.fact_id]
        );
        // Superseded facts are still reported
        assert_eq!(all[1].status, Status::Superseded);

        let recent = storage.read(|tx| tx.changes_since(&filter, Some(cutoff), 10))?;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, b.fact_id);
        Ok(())
    }

    #[test]
    fn test_query_counter_counts_statements() -> Result<()> {
        let storage = Storage::open_memory()?;
        let before = storage.query_count();
        storage.read(|tx| tx.load_bundles(&[Ulid::new(), Ulid::new()]))?;
        assert_eq!(storage.query_count() - before, 2);

        let before = storage.query_count();
        storage.read(|tx| tx.load_bundles(&[]))?;
        assert_eq!(storage.query_count(), before);
        Ok(())
    }

    #[test]
    fn test_stats() -> Result<()> {
        let storage = Storage::open_memory()?;
        resolve(&storage, db("PostgreSQL"), &ctx())?;
        resolve(&storage, db("MongoDB"), &ctx())?;
        resolve(&storage, db("MySQL").with_signal(true), &ctx())?;

        let stats = storage.stats(&ScopeFilter::project("/work/repo"))?;
        assert_eq!(stats.total_facts, 3);
        assert_eq!(stats.active_facts, 1);
        assert_eq!(stats.disputed_facts, 1);
        assert_eq!(stats.retired_facts, 1);
        // Superseding the holder closed its conflict
        assert_eq!(stats.open_conflicts, 0);
        Ok(())
    }

    #[test]
    fn test_file_store_reopens() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("facts.db");
        let id = {
            let storage = Storage::open(&path)?;
            resolve(&storage, db("MySQL"), &ctx())?.fact_id
        };
        let storage = Storage::open(&path)?;
        let facts = storage.read(|tx| tx.load_facts(&[id]))?;
        assert_eq!(facts.len(), 1);
        assert_eq!(storage.path(), Some(path.as_path()));
        Ok(())
    }
}
