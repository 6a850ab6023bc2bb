mod db;
mod dom;
mod fetch;
mod parser;
mod settings;

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use url::Url;

use db::{ActPageRow, ActPageWriter, PendingPage};
use fetch::{FetchStats, Fetcher};
use parser::index::{self, ParsedIndex};
use settings::Settings;

#[derive(Parser)]
#[command(name = "ilcs_scraper", about = "Illinois Compiled Statutes index and act text scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the chapter index and store every chapter
    Chapters,
    /// Fetch act indexes for unvisited chapters
    Acts {
        /// Max chapters to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch act text pages, following "View Entire Act" links
    Scrape {
        /// Max acts to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Split fetched act pages into sections
    Process {
        /// Max pages to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Chapters + acts + scrape + process in one pipeline
    Run {
        /// Max acts to scrape+process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print stored index entries
    Index {
        /// ILCS ChapterID whose acts to list (default: list chapters)
        #[arg(short, long)]
        chapter: Option<i64>,
        /// Print JSON instead of the title/topic/url text format
        #[arg(long)]
        json: bool,
    },
    /// Write acts with their sections as JSON lines
    Export {
        #[arg(short, long, default_value = "data/acts.jsonl")]
        out: String,
    },
    /// Show scraping statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    debug!(?settings, "Loaded settings");

    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;

    let result = match cli.command {
        Commands::Chapters => {
            let fetcher = Fetcher::new(&settings)?;
            let (inserted, found) = fetch_chapters(&conn, &fetcher, &settings).await?;
            println!("Inserted {} new chapters ({} total found)", inserted, found);
            Ok(())
        }
        Commands::Acts { limit } => {
            let chapters = db::fetch_unvisited_chapters(&conn, limit)?;
            if chapters.is_empty() {
                println!("No unvisited chapters. Run 'chapters' first or all chapters are fetched.");
                return Ok(());
            }
            println!("Fetching act indexes for {} chapters...", chapters.len());
            let fetcher = Arc::new(Fetcher::new(&settings)?);
            let (stats, inserted) = fetch_act_indexes(&conn, fetcher, settings.concurrency, chapters).await?;
            println!(
                "Done: {} chapters ({} ok, {} errors), {} new acts.",
                stats.total, stats.ok, stats.errors, inserted
            );
            Ok(())
        }
        Commands::Scrape { limit } => {
            let acts = db::fetch_unvisited_acts(&conn, limit)?;
            if acts.is_empty() {
                println!("No unvisited acts. Run 'acts' first or all acts are scraped.");
                return Ok(());
            }
            println!("Scraping {} acts (streaming to DB)...", acts.len());
            let fetcher = Arc::new(Fetcher::new(&settings)?);
            let stats = scrape_acts(&conn, fetcher, &settings, acts).await?;
            println!(
                "Done: {} scraped ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No unprocessed pages. Run 'scrape' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pages.len());
            let counts = process_pages(&conn, &pages, &settings.section_delimiter)?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit } => {
            let fetcher = Arc::new(Fetcher::new(&settings)?);

            // Phase 1: Index
            let t_index = Instant::now();
            let (inserted, found) = fetch_chapters(&conn, &fetcher, &settings).await?;
            println!("Chapters: {} new ({} found)", inserted, found);
            let chapters = db::fetch_unvisited_chapters(&conn, None)?;
            if !chapters.is_empty() {
                let (stats, acts) =
                    fetch_act_indexes(&conn, Arc::clone(&fetcher), settings.concurrency, chapters).await?;
                println!(
                    "Act indexes: {} chapters ({} ok, {} errors), {} new acts in {:.1}s",
                    stats.total, stats.ok, stats.errors, acts, t_index.elapsed().as_secs_f64()
                );
            }

            // Phase 2: Scrape (streaming to DB)
            let t_scrape = Instant::now();
            let acts = db::fetch_unvisited_acts(&conn, limit)?;
            if acts.is_empty() {
                println!("No unvisited acts.");
            } else {
                println!("Pipeline: scraping {} acts (streaming to DB)...", acts.len());
                let stats = scrape_acts(&conn, fetcher, &settings, acts).await?;
                println!(
                    "Scraped {} acts ({} ok, {} errors) in {:.1}s",
                    stats.total, stats.ok, stats.errors, t_scrape.elapsed().as_secs_f64()
                );
            }

            // Phase 3: Process
            let t_process = Instant::now();
            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process.");
                return Ok(());
            }
            println!("Processing {} pages...", unprocessed.len());
            let counts = process_pages(&conn, &unprocessed, &settings.section_delimiter)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Index { chapter, json } => {
            let entries = db::list_index(&conn, chapter)?;
            if entries.is_empty() {
                println!("No index entries stored.");
                return Ok(());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print!("{}", index::render_index(&entries));
            }
            Ok(())
        }
        Commands::Export { out } => {
            let acts = db::export_acts(&conn)?;
            let written = export_jsonl(&out, &acts)?;
            println!("Wrote {} acts to {}", written, out);
            Ok(())
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Chapters:       {} ({} visited)", s.chapters, s.chapters_visited);
            println!("Acts:           {} ({} visited)", s.acts, s.acts_visited);
            println!("Pages:          {} ({} errors)", s.pages, s.page_errors);
            println!("Acts with text: {}", s.acts_with_text);
            println!("Sections:       {}", s.sections);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Returns (newly inserted, found on the page).
async fn fetch_chapters(
    conn: &rusqlite::Connection,
    fetcher: &Fetcher,
    settings: &Settings,
) -> Result<(usize, usize)> {
    let index_url = settings.chapter_index_url();
    info!("Fetching chapter index: {}", index_url);
    let html = fetcher.fetch_text(&index_url).await?;
    let base = Url::parse(&index_url).with_context(|| format!("Invalid base url {}", index_url))?;

    let parsed = parser::extract_index_page(&html, &base)?;
    report_skipped(&index_url, &parsed);
    let inserted = db::insert_chapters(conn, &parsed.entries)?;
    Ok((inserted, parsed.entries.len()))
}

/// Outcome of fetching one chapter's act index.
struct ChapterResult {
    chapter: PendingPage,
    index: Result<ParsedIndex, String>,
}

async fn fetch_act_indexes(
    conn: &rusqlite::Connection,
    fetcher: Arc<Fetcher>,
    concurrency: usize,
    chapters: Vec<PendingPage>,
) -> Result<(FetchStats, usize)> {
    let mut inserted = 0usize;

    let stats = fetch::fetch_streaming(
        chapters,
        concurrency,
        move |chapter: PendingPage| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                let page = fetcher.fetch(&chapter.url).await;
                let index = match (page.html, page.error) {
                    (Some(html), None) => Url::parse(&chapter.url)
                        .map_err(|e| e.to_string())
                        .and_then(|base| {
                            parser::extract_index_page(&html, &base).map_err(|e| e.to_string())
                        }),
                    (_, Some(e)) => Err(e),
                    (None, None) => Err("empty response".to_string()),
                };
                ChapterResult { chapter, index }
            }
        },
        |result: ChapterResult| {
            match result.index {
                Ok(parsed) => {
                    report_skipped(&result.chapter.url, &parsed);
                    inserted += db::insert_acts(conn, result.chapter.id, &parsed.entries)?;
                    db::mark_chapter_visited(conn, result.chapter.id, None)?;
                    Ok(true)
                }
                Err(e) => {
                    warn!("Act index failed for {}: {}", result.chapter.title, e);
                    db::mark_chapter_visited(conn, result.chapter.id, Some(e.as_str()))?;
                    Ok(false)
                }
            }
        },
    )
    .await?;

    Ok((stats, inserted))
}

async fn scrape_acts(
    conn: &rusqlite::Connection,
    fetcher: Arc<Fetcher>,
    settings: &Settings,
    acts: Vec<PendingPage>,
) -> Result<FetchStats> {
    let delimiter = Arc::new(settings.section_delimiter.clone());
    let phrase = Arc::new(settings.entire_act_phrase.clone());
    let mut writer = ActPageWriter::new(conn)?;

    fetch::fetch_streaming(
        acts,
        settings.concurrency,
        move |act: PendingPage| {
            let fetcher = Arc::clone(&fetcher);
            let delimiter = Arc::clone(&delimiter);
            let phrase = Arc::clone(&phrase);
            async move { scrape_act(&fetcher, act, &delimiter, &phrase).await }
        },
        |row: ActPageRow| {
            let ok = row.error.is_none();
            writer.save(&row)?;
            Ok(ok)
        },
    )
    .await
}

/// Fetch one act page. When the page renders no section tables but links to
/// the entire act, the linked page is fetched and stored in its place.
async fn scrape_act(fetcher: &Fetcher, act: PendingPage, delimiter: &str, phrase: &str) -> ActPageRow {
    let page = fetcher.fetch(&act.url).await;
    let mut row = ActPageRow {
        act_row_id: act.id,
        url: act.url.clone(),
        source_url: act.url.clone(),
        html: page.html,
        status: page.status,
        error: page.error,
        latency_ms: Some(page.latency_ms),
    };

    let Some(html) = row.html.as_deref() else {
        warn!("Fetch failed for {}: {}", act.title, row.error.as_deref().unwrap_or("no body"));
        return row;
    };

    let continuation = match Url::parse(&act.url) {
        Ok(base) => match parser::extract_act_page(html, &base, delimiter, phrase) {
            Ok(extracted) if extracted.document.is_empty() => extracted.continuation,
            Ok(_) => None,
            Err(e) => {
                warn!("Could not read act body for {}: {}", act.title, e);
                None
            }
        },
        Err(e) => {
            warn!("Invalid act url {}: {}", act.url, e);
            None
        }
    };

    let Some(entire_act_url) = continuation else {
        return row;
    };

    debug!("{} has no inline sections, following {}", act.title, entire_act_url);
    let full = fetcher.fetch(&entire_act_url).await;
    row.source_url = entire_act_url;
    row.html = full.html;
    row.status = full.status;
    row.error = full.error;
    row.latency_ms = Some(page.latency_ms + full.latency_ms);
    row
}

fn report_skipped(url: &str, parsed: &ParsedIndex) {
    if parsed.skipped.is_empty() {
        return;
    }
    warn!(
        "{}: skipped {} malformed index entries (kept {})",
        url,
        parsed.skipped.len(),
        parsed.entries.len()
    );
    for s in &parsed.skipped {
        debug!(position = s.position, reason = %s.reason, fragment = %s.fragment, "Skipped index entry");
    }
}

struct ProcessCounts {
    pages: usize,
    acts_with_text: usize,
    sections: usize,
    failed: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Processed {} pages: {} acts with text, {} sections, {} failed.",
            self.pages, self.acts_with_text, self.sections, self.failed,
        );
    }
}

fn process_pages(
    conn: &rusqlite::Connection,
    pages: &[db::StoredActPage],
    delimiter: &str,
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        pages: 0,
        acts_with_text: 0,
        sections: 0,
        failed: 0,
    };

    for chunk in pages.chunks(500) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|page| parser::process_page(page, delimiter))
            .collect();

        let mut rows = Vec::new();
        for (page, result) in chunk.iter().zip(results) {
            match result {
                Ok(sections) => {
                    if !sections.is_empty() {
                        counts.acts_with_text += 1;
                    }
                    counts.sections += sections.len();
                    rows.extend(sections);
                }
                Err(e) => {
                    warn!("Failed to process page {}: {}", page.source_url, e);
                    counts.failed += 1;
                }
            }
        }

        counts.pages += chunk.len();
        let processed: Vec<i64> = chunk.iter().map(|p| p.page_id).collect();
        db::save_sections(conn, &processed, &rows)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn export_jsonl(path: &str, acts: &[db::ExportedAct]) -> Result<usize> {
    if let Some(dir) = std::path::Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = std::fs::File::create(path).with_context(|| format!("Failed to create {}", path))?;
    let mut out = std::io::BufWriter::new(file);
    for act in acts {
        serde_json::to_writer(&mut out, act)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(acts.len())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
