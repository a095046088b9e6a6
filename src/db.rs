use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{Result, ScrapeError};
use crate::record::{BasicRecord, Field, ProductDetails, ProductRecord};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            url                  TEXT PRIMARY KEY,
            name                 TEXT,
            image_url            TEXT,
            full_price           TEXT,
            discounted_price     TEXT,
            description          TEXT,
            sizes                TEXT,
            rating               TEXT,
            review_count         INTEGER NOT NULL DEFAULT 0,
            discovered_at        TEXT NOT NULL,
            details_attempted_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_products_attempted ON products(details_attempted_at);
        ",
    )?;
    Ok(())
}

// ── Discovery ──

/// Insert a listing record unless its URL is already known. Returns whether a row was added.
pub fn upsert_basic(conn: &Connection, record: &BasicRecord) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO products
         (url, name, image_url, full_price, discounted_price, discovered_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let inserted = stmt.execute(params![
        record.url,
        record.name,
        record.image_url,
        record.full_price,
        record.discounted_price,
        Utc::now().to_rfc3339(),
    ])?;
    Ok(inserted == 1)
}

// ── Enrichment ──

/// Which records the enricher should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkSelection {
    /// Records enrichment has never run on.
    NeverAttempted,
    /// Also records whose description was looked for and not found.
    MissingDescription,
}

impl WorkSelection {
    pub fn from_force(force_refresh: bool) -> Self {
        if force_refresh {
            WorkSelection::MissingDescription
        } else {
            WorkSelection::NeverAttempted
        }
    }
}

pub fn urls_missing_details(
    conn: &Connection,
    selection: WorkSelection,
    limit: Option<usize>,
) -> Result<Vec<String>> {
    let filter = match selection {
        WorkSelection::NeverAttempted => "details_attempted_at IS NULL",
        WorkSelection::MissingDescription => "description IS NULL",
    };
    let sql = format!(
        "SELECT url FROM products WHERE {} ORDER BY rowid{}",
        filter,
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let urls = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(urls)
}

/// Write extracted details and mark the record attempted. Returns `false` for unknown URLs.
pub fn apply_details(conn: &Connection, url: &str, details: &ProductDetails) -> Result<bool> {
    let sizes = if details.sizes.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&details.sizes).map_err(|e| ScrapeError::Corrupt {
            url: url.to_string(),
            reason: e.to_string(),
        })?)
    };

    let mut stmt = conn.prepare_cached(
        "UPDATE products
         SET description = ?1, sizes = ?2, rating = ?3, review_count = ?4,
             details_attempted_at = ?5
         WHERE url = ?6",
    )?;
    let updated = stmt.execute(params![
        details.description,
        sizes,
        details.rating,
        details.review_count.unwrap_or(0),
        Utc::now().to_rfc3339(),
        url,
    ])?;
    Ok(updated == 1)
}

// ── Export ──

pub fn export_all(conn: &Connection) -> Result<Vec<ProductRecord>> {
    let mut stmt = conn.prepare(
        "SELECT url, name, image_url, full_price, discounted_price,
                description, sizes, rating, review_count,
                details_attempted_at IS NOT NULL
         FROM products
         ORDER BY rowid",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                BasicRecord {
                    url: row.get(0)?,
                    name: row.get(1)?,
                    image_url: row.get(2)?,
                    full_price: row.get(3)?,
                    discounted_price: row.get(4)?,
                },
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, u32>(8)?,
                row.get::<_, bool>(9)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(basic, description, sizes, rating, review_count, attempted)| {
            let sizes = sizes
                .map(|raw| serde_json::from_str::<Vec<String>>(&raw))
                .transpose()
                .map_err(|e| ScrapeError::Corrupt {
                    url: basic.url.clone(),
                    reason: format!("sizes column: {}", e),
                })?;
            Ok(ProductRecord {
                url: basic.url,
                name: basic.name,
                image_url: basic.image_url,
                full_price: basic.full_price,
                discounted_price: basic.discounted_price,
                description: Field::from_column(attempted, description),
                sizes: Field::from_column(attempted, sizes),
                rating: Field::from_column(attempted, rating),
                review_count,
            })
        })
        .collect()
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub enriched: usize,
    pub attempted_absent: usize,
    pub never_attempted: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
    let enriched: usize = conn.query_row(
        "SELECT COUNT(*) FROM products WHERE description IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let never_attempted: usize = conn.query_row(
        "SELECT COUNT(*) FROM products WHERE details_attempted_at IS NULL",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        enriched,
        attempted_absent: total.saturating_sub(enriched + never_attempted),
        never_attempted,
    })
}

#[cfg(test)]
pub(crate) fn memory() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}
