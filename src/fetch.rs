use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::settings::Settings;

/// Outcome of fetching one page, after retries.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: i64,
}

/// Stats returned after a streaming fetch completes.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

pub struct Fetcher {
    client: reqwest::Client,
    max_retries: u32,
    base_backoff_ms: u64,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
            base_backoff_ms: settings.base_backoff_ms,
        })
    }

    /// Fetch a page that must succeed, e.g. the chapter index.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let page = self.fetch(url).await;
        match (page.html, page.error) {
            (Some(html), None) => Ok(html),
            (_, Some(e)) => Err(anyhow::anyhow!("Failed to fetch {}: {}", url, e)),
            (None, None) => Err(anyhow::anyhow!("Empty response from {}", url)),
        }
    }

    /// Fetch with exponential backoff on transport errors, 429 and 5xx.
    /// Never fails: the last error is recorded on the returned page.
    pub async fn fetch(&self, url: &str) -> FetchedPage {
        let start = Instant::now();
        let mut attempt = 0;
        loop {
            let (page, retryable) = self.fetch_once(url, start).await;
            if !retryable || attempt >= self.max_retries {
                return page;
            }

            let backoff = backoff_delay(self.base_backoff_ms, attempt);
            warn!(
                "Retrying {} (attempt {}/{}) after {:?}, backing off {:.1}s",
                url,
                attempt + 1,
                self.max_retries,
                page.error,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn fetch_once(&self, url: &str, start: Instant) -> (FetchedPage, bool) {
        let mut page = FetchedPage {
            html: None,
            status: None,
            error: None,
            latency_ms: 0,
        };

        let retryable = match self.client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                page.status = Some(status.as_u16() as i32);
                if status.is_success() {
                    match resp.text().await {
                        Ok(body) => page.html = Some(body),
                        Err(e) => page.error = Some(e.to_string()),
                    }
                    page.error.is_some()
                } else {
                    page.error = Some(format!("HTTP {}", status));
                    is_retryable(status)
                }
            }
            Err(e) => {
                page.error = Some(e.to_string());
                true
            }
        };

        page.latency_ms = start.elapsed().as_millis() as i64;
        (page, retryable)
    }
}

/// `base_ms * 2^attempt`, saturating instead of overflowing.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Run `work` for every job with at most `concurrency` in flight, handing
/// each result to `sink` on the calling task as it arrives.
pub async fn fetch_streaming<J, T, W, Fut, S>(
    jobs: Vec<J>,
    concurrency: usize,
    work: W,
    mut sink: S,
) -> Result<FetchStats>
where
    J: Send + 'static,
    T: Send + 'static,
    W: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    S: FnMut(T) -> Result<bool>,
{
    let total = jobs.len();
    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let work = Arc::new(work);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<T>(concurrency * 2);

    for job in jobs {
        let sem = Arc::clone(&semaphore);
        let work = Arc::clone(&work);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let result = work(job).await;
            let _ = tx.send(result).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;
    while let Some(result) = rx.recv().await {
        if sink(result)? {
            ok += 1;
        } else {
            errors += 1;
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}
