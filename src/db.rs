use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;

use crate::parser::index::IndexEntry;

static CHAPTER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[?&]ChapterID=(\d+)").unwrap());
static ACT_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)[?&]ActID=(\d+)").unwrap());

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chapters (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            chapter_id INTEGER,
            title      TEXT NOT NULL,
            topic      TEXT NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            error      TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_chapters_visited ON chapters(visited);

        CREATE TABLE IF NOT EXISTS acts (
            id          INTEGER PRIMARY KEY,
            chapter_row INTEGER NOT NULL REFERENCES chapters(id),
            url         TEXT UNIQUE NOT NULL,
            act_id      INTEGER,
            title       TEXT NOT NULL,
            topic       TEXT NOT NULL,
            visited     BOOLEAN NOT NULL DEFAULT 0,
            visited_at  TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_acts_visited ON acts(visited);
        CREATE INDEX IF NOT EXISTS idx_acts_chapter ON acts(chapter_row);

        CREATE TABLE IF NOT EXISTS act_pages (
            id           INTEGER PRIMARY KEY,
            act_row      INTEGER NOT NULL REFERENCES acts(id),
            url          TEXT NOT NULL,
            source_url   TEXT NOT NULL,
            html         TEXT,
            status       INTEGER,
            error        TEXT,
            latency_ms   INTEGER,
            scraped_at   TEXT NOT NULL DEFAULT (datetime('now')),
            processed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_act_pages_act ON act_pages(act_row);

        CREATE TABLE IF NOT EXISTS act_sections (
            id           INTEGER PRIMARY KEY,
            page_id      INTEGER NOT NULL REFERENCES act_pages(id),
            act_row      INTEGER NOT NULL REFERENCES acts(id),
            position     INTEGER NOT NULL,
            text         TEXT NOT NULL,
            processed_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(act_row, position)
        );
        CREATE INDEX IF NOT EXISTS idx_sections_page ON act_sections(page_id);
        ",
    )?;
    Ok(())
}

pub fn chapter_id(url: &str) -> Option<i64> {
    CHAPTER_ID_RE.captures(url)?.get(1)?.as_str().parse().ok()
}

pub fn act_id(url: &str) -> Option<i64> {
    ACT_ID_RE.captures(url)?.get(1)?.as_str().parse().ok()
}

// ── Index ──

pub fn insert_chapters(conn: &Connection, entries: &[IndexEntry]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO chapters (url, chapter_id, title, topic) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for e in entries {
            count += stmt.execute(rusqlite::params![e.url, chapter_id(&e.url), e.title, e.topic])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn insert_acts(conn: &Connection, chapter_row: i64, entries: &[IndexEntry]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO acts (chapter_row, url, act_id, title, topic)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for e in entries {
            count += stmt.execute(rusqlite::params![
                chapter_row, e.url, act_id(&e.url), e.title, e.topic,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// A chapter or act row still waiting to be fetched.
#[derive(Debug, Clone)]
pub struct PendingPage {
    pub id: i64,
    pub url: String,
    pub title: String,
}

pub fn fetch_unvisited_chapters(conn: &Connection, limit: Option<usize>) -> Result<Vec<PendingPage>> {
    fetch_unvisited(conn, "chapters", limit)
}

pub fn fetch_unvisited_acts(conn: &Connection, limit: Option<usize>) -> Result<Vec<PendingPage>> {
    fetch_unvisited(conn, "acts", limit)
}

fn fetch_unvisited(conn: &Connection, table: &str, limit: Option<usize>) -> Result<Vec<PendingPage>> {
    let sql = format!(
        "SELECT id, url, title FROM {} WHERE visited = 0 ORDER BY id{}",
        table,
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PendingPage {
                id: row.get(0)?,
                url: row.get(1)?,
                title: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_chapter_visited(conn: &Connection, id: i64, error: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE chapters SET visited = 1, visited_at = datetime('now'), error = ?2 WHERE id = ?1",
        rusqlite::params![id, error],
    )?;
    Ok(())
}

/// Chapters when `chapter` is `None`, otherwise the acts of that chapter
/// (by its ILCS `ChapterID`).
pub fn list_index(conn: &Connection, chapter: Option<i64>) -> Result<Vec<IndexEntry>> {
    let rows = match chapter {
        None => conn
            .prepare("SELECT title, topic, url FROM chapters ORDER BY id")?
            .query_map([], index_entry)?
            .collect::<Result<Vec<_>, _>>()?,
        Some(id) => conn
            .prepare(
                "SELECT a.title, a.topic, a.url FROM acts a
                 JOIN chapters c ON c.id = a.chapter_row
                 WHERE c.chapter_id = ?1 ORDER BY a.id",
            )?
            .query_map([id], index_entry)?
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

fn index_entry(row: &rusqlite::Row) -> rusqlite::Result<IndexEntry> {
    Ok(IndexEntry {
        title: row.get(0)?,
        topic: row.get(1)?,
        url: row.get(2)?,
    })
}

// ── Act pages ──

pub struct ActPageRow {
    pub act_row_id: i64,
    pub url: String,
    /// Page the text came from: the act page itself or its "View Entire Act" page.
    pub source_url: String,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Statements reused for every fetched act page.
pub struct ActPageWriter<'c> {
    insert: rusqlite::Statement<'c>,
    update: rusqlite::Statement<'c>,
}

impl<'c> ActPageWriter<'c> {
    pub fn new(conn: &'c Connection) -> Result<Self> {
        Ok(Self {
            insert: conn.prepare(
                "INSERT INTO act_pages (act_row, url, source_url, html, status, error, latency_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?,
            update: conn.prepare(
                "UPDATE acts SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
            )?,
        })
    }

    pub fn save(&mut self, row: &ActPageRow) -> Result<()> {
        self.insert.execute(rusqlite::params![
            row.act_row_id, row.url, row.source_url, row.html, row.status, row.error, row.latency_ms,
        ])?;
        self.update.execute(rusqlite::params![row.act_row_id])?;
        Ok(())
    }
}

pub struct StoredActPage {
    pub page_id: i64,
    pub act_row_id: i64,
    pub source_url: String,
    pub html: String,
}

pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredActPage>> {
    let sql = format!(
        "SELECT p.id, p.act_row, p.source_url, p.html
         FROM act_pages p
         WHERE p.html IS NOT NULL AND p.processed_at IS NULL
         ORDER BY p.id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredActPage {
                page_id: row.get(0)?,
                act_row_id: row.get(1)?,
                source_url: row.get(2)?,
                html: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Sections ──

#[derive(Debug, Clone)]
pub struct SectionRow {
    pub page_id: i64,
    pub act_row_id: i64,
    pub position: i64,
    pub text: String,
}

/// Store `rows` and mark every page in `processed` done, including pages that
/// produced no sections or failed to parse.
pub fn save_sections(conn: &Connection, processed: &[i64], rows: &[SectionRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut insert = tx.prepare(
            "INSERT OR REPLACE INTO act_sections (page_id, act_row, position, text)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for r in rows {
            insert.execute(rusqlite::params![r.page_id, r.act_row_id, r.position, r.text])?;
        }
        let mut mark = tx.prepare("UPDATE act_pages SET processed_at = datetime('now') WHERE id = ?1")?;
        for id in processed {
            mark.execute([id])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Export ──

#[derive(Debug, Serialize)]
pub struct ExportedAct {
    pub chapter: String,
    pub chapter_id: Option<i64>,
    pub act_id: Option<i64>,
    pub title: String,
    pub topic: String,
    pub url: String,
    pub sections: Vec<String>,
}

/// Acts that have at least one section, with sections in source order.
pub fn export_acts(conn: &Connection) -> Result<Vec<ExportedAct>> {
    let mut acts_stmt = conn.prepare(
        "SELECT a.id, c.title, c.chapter_id, a.act_id, a.title, a.topic, a.url
         FROM acts a JOIN chapters c ON c.id = a.chapter_row
         WHERE EXISTS (SELECT 1 FROM act_sections s WHERE s.act_row = a.id)
         ORDER BY a.id",
    )?;
    let mut sections_stmt =
        conn.prepare("SELECT text FROM act_sections WHERE act_row = ?1 ORDER BY position")?;

    let acts = acts_stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                ExportedAct {
                    chapter: row.get(1)?,
                    chapter_id: row.get(2)?,
                    act_id: row.get(3)?,
                    title: row.get(4)?,
                    topic: row.get(5)?,
                    url: row.get(6)?,
                    sections: Vec::new(),
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(acts.len());
    for (id, mut act) in acts {
        act.sections = sections_stmt
            .query_map([id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        out.push(act);
    }
    Ok(out)
}

// ── Stats ──

pub struct Stats {
    pub chapters: i64,
    pub chapters_visited: i64,
    pub acts: i64,
    pub acts_visited: i64,
    pub pages: i64,
    pub page_errors: i64,
    pub acts_with_text: i64,
    pub sections: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        chapters: count("SELECT COUNT(*) FROM chapters")?,
        chapters_visited: count("SELECT COUNT(*) FROM chapters WHERE visited = 1")?,
        acts: count("SELECT COUNT(*) FROM acts")?,
        acts_visited: count("SELECT COUNT(*) FROM acts WHERE visited = 1")?,
        pages: count("SELECT COUNT(*) FROM act_pages")?,
        page_errors: count("SELECT COUNT(*) FROM act_pages WHERE error IS NOT NULL")?,
        acts_with_text: count("SELECT COUNT(DISTINCT act_row) FROM act_sections")?,
        sections: count("SELECT COUNT(*) FROM act_sections")?,
    })
}
