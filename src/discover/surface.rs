use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;

/// A rendered, scrollable product listing.
#[allow(async_fn_in_trait)]
pub trait ListingSurface {
    /// Navigate to the listing.
    async fn open(&mut self) -> Result<()>;

    /// Number of product cards currently rendered.
    async fn item_count(&mut self) -> Result<usize>;

    /// Ask the page for more cards (scroll the last one into view).
    async fn advance(&mut self) -> Result<()>;

    /// Full HTML of the page as currently rendered.
    async fn snapshot_html(&mut self) -> Result<String>;

    /// Release the session. Called on every exit path.
    async fn close(&mut self) -> Result<()>;

    /// Poll until more than `above` cards are rendered or `timeout` elapses.
    /// Returns the last count seen.
    async fn wait_for_items(
        &mut self,
        above: usize,
        timeout: Duration,
        poll: Duration,
    ) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            let count = self.item_count().await?;
            if count > above || Instant::now() >= deadline {
                return Ok(count);
            }
            tokio::time::sleep(poll.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }
}
