use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use url::Url;

use crate::db::RecordStore;
use crate::parser::{BlockDetector, CardExtractor};
use crate::session::{FetchSession, ProfilePool, SessionFactory};
use crate::settings::Settings;

const HTML_LOG_PREVIEW: usize = 500;
/// Upper bound on a single retry wait.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Crawl policy knobs, built from [`Settings`].
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub rotate_profile_per_page: bool,
    pub persist_raw_pages: bool,
    pub raw_pages_dir: PathBuf,
    pub persist_empty_records: bool,
    pub retry_limit: u32,
    pub retry_backoff: Duration,
}

impl From<&Settings> for CrawlOptions {
    fn from(s: &Settings) -> Self {
        Self {
            rotate_profile_per_page: s.rotate_profile_per_page,
            persist_raw_pages: s.persist_raw_pages,
            raw_pages_dir: s.raw_pages_dir.clone(),
            persist_empty_records: s.persist_empty_records,
            retry_limit: s.retry_limit,
            retry_backoff: Duration::from_millis(s.retry_backoff_ms),
        }
    }
}

/// Per-page state, reset for every page index.
#[derive(Debug)]
struct CrawlState {
    current_page: u32,
    total_pages: u32,
    block_detected: bool,
    attempt: u32,
}

/// Crawl stats returned after completion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages_attempted: usize,
    pub pages_scraped: usize,
    pub pages_abandoned: usize,
    pub blocks_detected: usize,
    pub records_found: usize,
    pub records_stored: usize,
    pub records_skipped: usize,
}

impl CrawlStats {
    pub fn print(&self) {
        println!(
            "Scraped {}/{} pages ({} abandoned, {} blocks). Stored {} of {} gigs ({} empty skipped).",
            self.pages_scraped,
            self.pages_attempted,
            self.pages_abandoned,
            self.blocks_detected,
            self.records_stored,
            self.records_found,
            self.records_skipped,
        );
    }
}

pub struct Crawler<'a, F: SessionFactory> {
    factory: F,
    profiles: ProfilePool,
    extractor: CardExtractor,
    detector: BlockDetector,
    store: &'a RecordStore,
    opts: CrawlOptions,
    rng: StdRng,
}

impl<'a, F: SessionFactory> Crawler<'a, F> {
    pub fn new(
        factory: F,
        profiles: ProfilePool,
        extractor: CardExtractor,
        detector: BlockDetector,
        store: &'a RecordStore,
        opts: CrawlOptions,
    ) -> Self {
        Self {
            factory,
            profiles,
            extractor,
            detector,
            store,
            opts,
            rng: StdRng::from_entropy(),
        }
    }

    /// Fix the profile rng, so session rotation is reproducible.
    #[cfg(test)]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Scrape pages `1..=num_pages` of `base_url`, one at a time, into the store.
    pub async fn run(&mut self, base_url: &str, num_pages: u32) -> Result<CrawlStats> {
        let base = Url::parse(base_url).with_context(|| format!("Invalid base url {}", base_url))?;
        let mut stats = CrawlStats::default();
        let mut session: Option<F::Session> = None;

        let pb = ProgressBar::new(num_pages as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages ({msg})")?
                .progress_chars("=> "),
        );

        for page in 1..=num_pages {
            let mut state = CrawlState {
                current_page: page,
                total_pages: num_pages,
                block_detected: false,
                attempt: 0,
            };
            let url = page_url(&base, page);
            stats.pages_attempted += 1;
            pb.set_message(format!("page {}", page));

            let html = loop {
                let mut current = match session.take() {
                    Some(s) => s,
                    None => self.open_session()?,
                };

                info!("Accessing URL: {} (page {}/{})", url, state.current_page, state.total_pages);
                match current.navigate(url.as_str()) {
                    Ok(html) => {
                        if self.opts.persist_raw_pages {
                            self.persist_raw(page, &html);
                        }
                        match self.detector.detect(&html) {
                            Some(indicator) => {
                                state.block_detected = true;
                                stats.blocks_detected += 1;
                                warn!(
                                    page,
                                    attempt = state.attempt + 1,
                                    "Captcha or human verification detected ({:?}). Switching proxy and retrying.",
                                    indicator
                                );
                                close_session(current);
                            }
                            None => {
                                if self.opts.rotate_profile_per_page {
                                    close_session(current);
                                } else {
                                    session = Some(current);
                                }
                                break Some(html);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(page, attempt = state.attempt + 1, "Navigation failed: {:#}", e);
                        close_session(current);
                    }
                }

                if state.attempt >= self.opts.retry_limit {
                    warn!(
                        "Giving up on page {} after {} attempts (block detected: {})",
                        page,
                        state.attempt + 1,
                        state.block_detected
                    );
                    break None;
                }
                let backoff = retry_backoff(self.opts.retry_backoff, state.attempt);
                debug!("Backing off {:.1}s before retrying page {}", backoff.as_secs_f64(), page);
                tokio::time::sleep(backoff).await;
                state.attempt += 1;
            };

            match html {
                Some(html) => {
                    self.store_page(page, &html, &mut stats)?;
                    stats.pages_scraped += 1;
                }
                None => stats.pages_abandoned += 1,
            }
            pb.inc(1);
        }

        if let Some(s) = session.take() {
            close_session(s);
        }
        pb.finish_and_clear();
        info!(
            "Crawl finished: {} pages scraped, {} abandoned, {} gigs stored",
            stats.pages_scraped, stats.pages_abandoned, stats.records_stored
        );
        Ok(stats)
    }

    fn open_session(&mut self) -> Result<F::Session> {
        let profile = self.profiles.choose(&mut self.rng)?;
        self.factory
            .open(&profile)
            .context("Failed to start fetch session")
    }

    fn store_page(&self, page: u32, html: &str, stats: &mut CrawlStats) -> Result<()> {
        debug!(
            "Fetched HTML content for page {}: {}...",
            page,
            preview(html, HTML_LOG_PREVIEW)
        );

        let records = self.extractor.extract(html);
        stats.records_found += records.len();
        if records.is_empty() {
            warn!(
                "No gigs found on page {}. Check the card selector or whether content loads dynamically.",
                page
            );
        }

        for rec in records {
            if rec.is_empty() && !self.opts.persist_empty_records {
                info!("Skipped storing empty gig data.");
                stats.records_skipped += 1;
                continue;
            }
            let id = self.store.write(&rec.title, &rec.description)?;
            info!(id, "Stored gig: {}...", preview(&rec.title, 50));
            stats.records_stored += 1;
        }
        Ok(())
    }

    fn persist_raw(&self, page: u32, html: &str) {
        let path = self
            .opts
            .raw_pages_dir
            .join(format!("page_source_page_{}.html", page));
        let res = std::fs::create_dir_all(&self.opts.raw_pages_dir)
            .and_then(|_| std::fs::write(&path, html));
        if let Err(e) = res {
            warn!("Failed to save raw page {}: {}", path.display(), e);
        }
    }
}

fn close_session<S: FetchSession>(session: S) {
    if let Err(e) = session.close() {
        warn!("Failed to close fetch session: {:#}", e);
    }
}

/// `base * 2^attempt`, capped at [`MAX_BACKOFF`].
fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_BACKOFF)
}

/// Set `page=<n>` on the base url, replacing any existing page parameter.
pub fn page_url(base: &Url, page: u32) -> Url {
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &page.to_string());
    url
}

fn preview(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ── Tests ──
