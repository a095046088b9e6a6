use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::surface::ListingSurface;
use crate::error::{Result, ScrapeError};
use crate::settings::DiscoverSettings;

/// Headless Chromium session on the listing page.
///
/// The handler task drives the DevTools connection and must outlive every page
/// call; `close` shuts the browser down and `Drop` aborts the handler if
/// `close` was never reached.
pub struct BrowserSurface {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    page: Option<Page>,
    listing_url: String,
    count_script: String,
    scroll_script: String,
}

impl BrowserSurface {
    pub async fn launch(settings: &DiscoverSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .request_timeout(Duration::from_secs(60))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-notifications")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(ScrapeError::Browser)?;

        info!("Launching browser for {}", settings.listing_url);
        let (browser, mut handler) = Browser::launch(config).await?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {:?}", e);
                }
            }
        });

        // Card selector is embedded as a JS string literal
        let selector = serde_json::to_string(&settings.selectors.card)
            .map_err(|e| ScrapeError::Config(e.to_string()))?;

        Ok(BrowserSurface {
            browser: Some(browser),
            handler: Some(handler),
            page: None,
            listing_url: settings.listing_url.clone(),
            count_script: format!("document.querySelectorAll({}).length", selector),
            scroll_script: format!(
                "(() => {{
                    const cards = document.querySelectorAll({});
                    if (cards.length > 0) {{
                        cards[cards.length - 1].scrollIntoView({{block: 'center'}});
                    }} else {{
                        window.scrollTo(0, document.body.scrollHeight);
                    }}
                    return cards.length;
                }})()",
                selector
            ),
        })
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ScrapeError::Browser("listing page is not open".into()))
    }
}

impl ListingSurface for BrowserSurface {
    async fn open(&mut self) -> Result<()> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ScrapeError::Browser("browser already closed".into()))?;
        let page = browser.new_page(self.listing_url.as_str()).await?;
        self.page = Some(page);
        Ok(())
    }

    async fn item_count(&mut self) -> Result<usize> {
        let result = self.page()?.evaluate(self.count_script.as_str()).await?;
        result
            .into_value::<usize>()
            .map_err(|e| ScrapeError::Browser(format!("card count: {}", e)))
    }

    async fn advance(&mut self) -> Result<()> {
        self.page()?.evaluate(self.scroll_script.as_str()).await?;
        Ok(())
    }

    async fn snapshot_html(&mut self) -> Result<String> {
        Ok(self.page()?.content().await?)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("closing listing page: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            browser.close().await?;
            if let Err(e) = browser.wait().await {
                warn!("waiting for browser exit: {}", e);
            }
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        info!("Browser closed");
        Ok(())
    }
}

impl Drop for BrowserSurface {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}
