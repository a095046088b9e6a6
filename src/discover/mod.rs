pub mod browser;
pub mod cards;
pub mod surface;

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::db;
use crate::error::{Result, ScrapeError};
use crate::settings::DiscoverSettings;
use cards::CardExtractor;
use surface::ListingSurface;

#[derive(Debug)]
pub struct DiscoverStats {
    pub cards: usize,
    pub inserted: usize,
    pub known: usize,
    /// Card count after every probe, starting with the initial render.
    pub history: Vec<usize>,
}

pub struct Discoverer {
    settings: DiscoverSettings,
    cards: CardExtractor,
    base: Url,
}

impl Discoverer {
    pub fn new(settings: &DiscoverSettings) -> Result<Self> {
        let base = Url::parse(&settings.listing_url)
            .map_err(|e| ScrapeError::Config(format!("listing_url: {}", e)))?;
        Ok(Discoverer {
            settings: settings.clone(),
            cards: CardExtractor::new(&settings.selectors)?,
            base,
        })
    }

    /// Load the whole listing, then record every card not already in the store.
    ///
    /// The surface is closed before this returns, whether or not the scan
    /// succeeded. Cancelling `cancel` stops scrolling and writes nothing.
    pub async fn run<S: ListingSurface>(
        &self,
        surface: &mut S,
        conn: &Connection,
        cancel: &CancellationToken,
    ) -> Result<DiscoverStats> {
        let scanned = self.scan(surface, cancel).await;
        let closed = surface.close().await;
        let (html, history) = scanned?;
        if let Err(e) = closed {
            warn!("closing listing session failed: {}", e);
        }

        let records = self.cards.extract(&html, &self.base);
        info!("Found {} products on the listing", records.len());

        let total = records.len();
        let mut inserted = 0usize;
        for (i, record) in records.iter().enumerate() {
            if db::upsert_basic(conn, record)? {
                inserted += 1;
                info!("[{}/{}] new: {}", i + 1, total, record.url);
            } else {
                debug!("[{}/{}] known: {}", i + 1, total, record.url);
            }
        }

        Ok(DiscoverStats {
            cards: total,
            inserted,
            known: total - inserted,
            history,
        })
    }

    async fn scan<S: ListingSurface>(
        &self,
        surface: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(String, Vec<usize>)> {
        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }
        surface.open().await?;

        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
            count = surface.wait_for_items(
                0,
                self.settings.initial_render_timeout(),
                self.settings.poll_interval(),
            ) => count?,
        };
        if first == 0 {
            return Err(ScrapeError::RenderTimeout {
                probes: 0,
                history: vec![0],
            });
        }

        let history = scroll_until_stable(surface, &self.settings, cancel).await?;
        let html = surface.snapshot_html().await?;
        Ok((html, history))
    }
}

/// Keep scrolling until the card count stops growing for `max_patience`
/// consecutive probes. Fails once `max_probes` is spent without settling,
/// or as soon as `cancel` fires.
pub async fn scroll_until_stable<S: ListingSurface>(
    surface: &mut S,
    settings: &DiscoverSettings,
    cancel: &CancellationToken,
) -> Result<Vec<usize>> {
    let mut history = vec![surface.item_count().await?];
    let mut patience = 0usize;
    let mut probes = 0usize;

    while patience < settings.max_patience {
        if cancel.is_cancelled() {
            info!("Scroll cancelled after {} probes", probes);
            return Err(ScrapeError::Cancelled);
        }
        if probes >= settings.max_probes {
            return Err(ScrapeError::RenderTimeout { probes, history });
        }
        probes += 1;

        let before = surface.item_count().await?;
        surface.advance().await?;
        let after = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
            count = surface.wait_for_items(
                before,
                settings.settle_timeout(),
                settings.poll_interval(),
            ) => count?,
        };
        history.push(after);

        if after > before {
            patience = 0;
            info!("{} products loaded", after);
        } else {
            patience += 1;
            debug!(
                "no new products at {}, patience {}/{}",
                after, patience, settings.max_patience
            );
        }
    }

    info!("Listing settled at {} products after {} probes", history.last().copied().unwrap_or(0), probes);
    Ok(history)
}
