pub mod details;
pub mod fetch;

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rand::Rng;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::db;
use crate::error::{FetchError, Result};
use crate::record::ProductDetails;
use crate::settings::EnrichSettings;
use details::DetailExtractor;
use fetch::PageFetcher;

/// Counts reported after an enrichment pass.
#[derive(Debug, Default)]
pub struct EnrichStats {
    pub total: usize,
    pub enriched: usize,
    pub failed: usize,
    /// Not started because the run was cancelled.
    pub skipped: usize,
    pub failures: Vec<(String, String)>,
}

enum Outcome {
    Fetched(ProductDetails),
    Failed(String),
    Skipped,
}

/// Fetches product pages on a bounded pool and streams details into the store.
pub struct Enricher<F> {
    fetcher: Arc<F>,
    extractor: Arc<DetailExtractor>,
    settings: EnrichSettings,
}

impl<F: PageFetcher> Enricher<F> {
    pub fn new(fetcher: F, settings: &EnrichSettings) -> Result<Self> {
        Ok(Enricher {
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(DetailExtractor::new(&settings.selectors)?),
            settings: settings.clone(),
        })
    }

    /// Enrich every URL in `urls`, writing each result as soon as it arrives.
    ///
    /// Fetch failures are counted and logged, never returned. A store error
    /// stops outstanding work and is returned.
    pub async fn run(
        &self,
        conn: &Connection,
        urls: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<EnrichStats> {
        let total = urls.len();
        let workers = self.settings.worker_count;
        let semaphore = Arc::new(Semaphore::new(workers));
        let stop = cancel.child_token();

        let pb = progress_bar(total);

        // Channel: workers send outcomes, this loop writes them to the store
        let (tx, mut rx) = tokio::sync::mpsc::channel::<(String, Outcome)>(workers * 2);

        for url in urls {
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let sem = Arc::clone(&semaphore);
            let stop = stop.clone();
            let tx = tx.clone();
            let jitter = (self.settings.jitter_min_ms, self.settings.jitter_max_ms);
            let timeout = self.settings.task_timeout();

            tokio::spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = stop.cancelled() => Outcome::Skipped,
                    permit = sem.acquire_owned() => match permit {
                        Ok(_permit) => {
                            enrich_one(&*fetcher, &extractor, &url, jitter, timeout, &stop).await
                        }
                        Err(_) => Outcome::Skipped,
                    },
                };
                let _ = tx.send((url, outcome)).await;
            });
        }

        // Drop our copy of tx so rx closes when all spawned tasks finish
        drop(tx);

        let mut stats = EnrichStats {
            total,
            ..Default::default()
        };
        let mut received = 0usize;

        while let Some((url, outcome)) = rx.recv().await {
            received += 1;
            match outcome {
                Outcome::Fetched(details) => match db::apply_details(conn, &url, &details) {
                    Ok(true) => {
                        stats.enriched += 1;
                        info!(
                            description = details.description.is_some(),
                            sizes = details.sizes.len(),
                            rating = details.rating.as_deref().unwrap_or("-"),
                            "enriched {}",
                            url
                        );
                    }
                    Ok(false) => {
                        warn!("{} is no longer in the store; details dropped", url);
                        stats.failed += 1;
                        stats.failures.push((url, "record missing from store".to_string()));
                    }
                    Err(e) => {
                        stop.cancel();
                        pb.abandon();
                        return Err(e);
                    }
                },
                Outcome::Failed(reason) => {
                    warn!("failed to enrich {}: {}", url, reason);
                    stats.failed += 1;
                    stats.failures.push((url, reason));
                }
                Outcome::Skipped => stats.skipped += 1,
            }
            pb.inc(1);
        }

        pb.finish_and_clear();

        // A worker that panicked never reports back
        if received < total {
            let lost = total - received;
            warn!("{} enrichment tasks ended without reporting", lost);
            stats.failed += lost;
            stats.failures.extend((0..lost).map(|_| {
                (
                    "<unknown>".to_string(),
                    "task ended without reporting".to_string(),
                )
            }));
        }

        info!(
            "Enriched {} of {} pages ({} failed, {} skipped)",
            stats.enriched, stats.total, stats.failed, stats.skipped
        );
        Ok(stats)
    }
}

async fn enrich_one<F: PageFetcher>(
    fetcher: &F,
    extractor: &DetailExtractor,
    url: &str,
    (jitter_min_ms, jitter_max_ms): (u64, u64),
    timeout: Duration,
    stop: &CancellationToken,
) -> Outcome {
    let delay = jitter(jitter_min_ms, jitter_max_ms);
    tokio::select! {
        _ = stop.cancelled() => return Outcome::Skipped,
        _ = tokio::time::sleep(delay) => {}
    }

    match tokio::time::timeout(timeout, fetcher.fetch(url)).await {
        Ok(Ok(html)) => Outcome::Fetched(extractor.extract(&html)),
        Ok(Err(e)) => Outcome::Failed(e.to_string()),
        Err(_) => Outcome::Failed(FetchError::Timeout(timeout).to_string()),
    }
}

fn jitter(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::db::{self, WorkSelection};
    use crate::record::{BasicRecord, Field};

    const PAGE: &str = r#"<html><body>
        <div data-test-id="pdp-product-description"><div>Cushioned trainer.</div></div>
        <span data-content="size-value">UK 6</span>
        <script type="application/ld+json">{"aggregateRating": {"ratingValue": 4, "reviewCount": 3}}</script>
        </body></html>"#;

    /// Serves canned pages; URLs in `failing` return a transport-style error.
    struct StubFetcher {
        pages: HashMap<String, String>,
        failing: HashSet<String>,
        panicking: HashSet<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl StubFetcher {
        fn new(urls: &[String], failing: &[String], delay: Duration) -> Self {
            StubFetcher {
                pages: urls.iter().map(|u| (u.clone(), PAGE.to_string())).collect(),
                failing: failing.iter().cloned().collect(),
                panicking: HashSet::new(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                delay,
            }
        }
    }

    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panicking.contains(url) {
                panic!("worker crashed on {}", url);
            }
            if self.failing.contains(url) {
                return Err(FetchError::Status(503));
            }
            Ok(self.pages.get(url).cloned().unwrap_or_default())
        }
    }

    fn settings(workers: usize) -> EnrichSettings {
        EnrichSettings {
            worker_count: workers,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            task_timeout_ms: 1_000,
            ..Default::default()
        }
    }

    fn seed(conn: &Connection, n: usize) -> Vec<String> {
        (0..n)
            .map(|i| {
                let url = format!("https://shop.test/pd/{}", i);
                db::upsert_basic(
                    conn,
                    &BasicRecord {
                        url: url.clone(),
                        name: Some(format!("Shoe {}", i)),
                        image_url: None,
                        full_price: Some("₹3,999".to_string()),
                        discounted_price: None,
                    },
                )
                .unwrap();
                url
            })
            .collect()
    }

    #[tokio::test]
    async fn partial_failures_do_not_stop_the_pool() {
        let conn = db::memory();
        let urls = seed(&conn, 10);
        let failing = vec![urls[3].clone(), urls[7].clone()];
        let enricher = Enricher::new(
            StubFetcher::new(&urls, &failing, Duration::from_millis(5)),
            &settings(10),
        )
        .unwrap();

        let stats = enricher
            .run(&conn, urls.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.total, 10);
        assert_eq!(stats.enriched, 8);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.skipped, 0);
        let failed_urls: HashSet<_> = stats.failures.iter().map(|(u, _)| u.clone()).collect();
        assert_eq!(failed_urls, failing.iter().cloned().collect());

        // Failed URLs stay outstanding for the next run
        let remaining = db::urls_missing_details(&conn, WorkSelection::NeverAttempted, None).unwrap();
        assert_eq!(remaining, failing);

        let records = db::export_all(&conn).unwrap();
        let done = records.iter().find(|r| r.url == urls[0]).unwrap();
        assert_eq!(done.description, Field::Present("Cushioned trainer.".to_string()));
        assert_eq!(done.sizes, Field::Present(vec!["UK 6".to_string()]));
        assert_eq!(done.rating, Field::Present("4".to_string()));
        assert_eq!(done.review_count, 3);
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_worker_count() {
        let conn = db::memory();
        let urls = seed(&conn, 12);
        let enricher = Enricher::new(
            StubFetcher::new(&urls, &[], Duration::from_millis(20)),
            &settings(3),
        )
        .unwrap();

        let stats = enricher
            .run(&conn, urls, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.enriched, 12);
        let peak = enricher.fetcher.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {}", peak);
    }

    #[tokio::test]
    async fn second_pass_has_nothing_to_do() {
        let conn = db::memory();
        let urls = seed(&conn, 4);
        let enricher = Enricher::new(
            StubFetcher::new(&urls, &[], Duration::from_millis(1)),
            &settings(2),
        )
        .unwrap();

        let before = db::urls_missing_details(&conn, WorkSelection::NeverAttempted, None).unwrap();
        enricher
            .run(&conn, before.clone(), &CancellationToken::new())
            .await
            .unwrap();
        let after = db::urls_missing_details(&conn, WorkSelection::NeverAttempted, None).unwrap();
        assert!(after.len() <= before.len());
        assert!(after.is_empty());

        // Enriched records are not picked up again, even when forced
        let forced = db::urls_missing_details(&conn, WorkSelection::MissingDescription, None).unwrap();
        assert!(forced.is_empty());
    }

    #[tokio::test]
    async fn slow_fetch_times_out_without_stalling_others() {
        let conn = db::memory();
        let urls = seed(&conn, 3);
        let mut s = settings(3);
        s.task_timeout_ms = 20;
        let enricher = Enricher::new(
            StubFetcher::new(&urls, &[], Duration::from_millis(200)),
            &s,
        )
        .unwrap();

        let stats = enricher
            .run(&conn, urls, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.failed, 3);
        assert!(stats.failures.iter().all(|(_, r)| r.contains("timed out")));
    }

    #[tokio::test]
    async fn cancelled_run_skips_everything() {
        let conn = db::memory();
        let urls = seed(&conn, 5);
        let enricher = Enricher::new(
            StubFetcher::new(&urls, &[], Duration::from_millis(1)),
            &settings(2),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = enricher.run(&conn, urls, &cancel).await.unwrap();

        assert_eq!(stats.skipped, 5);
        assert_eq!(stats.enriched, 0);
        assert_eq!(enricher.fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            db::urls_missing_details(&conn, WorkSelection::NeverAttempted, None)
                .unwrap()
                .len(),
            5
        );
    }

    #[tokio::test]
    async fn crashed_worker_is_listed_as_a_failure() {
        let conn = db::memory();
        let urls = seed(&conn, 4);
        let mut fetcher = StubFetcher::new(&urls, &[], Duration::from_millis(1));
        fetcher.panicking.insert(urls[2].clone());
        let enricher = Enricher::new(fetcher, &settings(2)).unwrap();

        let stats = enricher
            .run(&conn, urls, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.enriched, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failures.len(), stats.failed);
        assert_eq!(stats.failures[0].1, "task ended without reporting");
    }

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..100 {
            let d = jitter(1_500, 4_000);
            assert!(d >= Duration::from_millis(1_500) && d <= Duration::from_millis(4_000));
        }
        assert_eq!(jitter(0, 0), Duration::ZERO);
    }
}
