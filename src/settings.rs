use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{Result, ScrapeError};

const DEFAULT_CONFIG_FILE: &str = "scraper.toml";
const ENV_PREFIX: &str = "SCRAPER";

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/117.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub discover: DiscoverSettings,
    pub enrich: EnrichSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub db_path: PathBuf,
    pub csv_path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            db_path: PathBuf::from("data/products.sqlite"),
            csv_path: PathBuf::from("data/final_dataset.csv"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverSettings {
    pub listing_url: String,
    /// Consecutive no-growth probes tolerated before the listing counts as loaded.
    pub max_patience: usize,
    /// Hard ceiling on probes; reaching it means the listing never settled.
    pub max_probes: usize,
    pub initial_render_timeout_ms: u64,
    /// How long to wait for new cards after each scroll.
    pub settle_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub selectors: ListingSelectors,
}

impl Default for DiscoverSettings {
    fn default() -> Self {
        DiscoverSettings {
            listing_url: "https://in.puma.com/in/en/womens/womens-shoes".to_string(),
            max_patience: 7,
            max_probes: 500,
            initial_render_timeout_ms: 15_000,
            settle_timeout_ms: 3_000,
            poll_interval_ms: 250,
            headless: true,
            chrome_executable: None,
            selectors: ListingSelectors::default(),
        }
    }
}

impl DiscoverSettings {
    pub fn initial_render_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_render_timeout_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// CSS selectors for product cards on the listing page.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    pub card: String,
    pub link: String,
    pub name: String,
    pub image: String,
    pub full_price: String,
    pub discounted_price: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        ListingSelectors {
            card: r#"li[data-test-id="product-list-item"]"#.to_string(),
            link: r#"a[data-test-id="product-list-item-link"]"#.to_string(),
            name: "h3".to_string(),
            image: "img".to_string(),
            full_price: r#"span[data-test-id="price"]"#.to_string(),
            discounted_price: r#"span[data-test-id="sale-price"]"#.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichSettings {
    pub worker_count: usize,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    /// Upper bound on one fetch, jitter excluded.
    pub task_timeout_ms: u64,
    /// Also re-fetch pages whose description was looked for and not found.
    pub force_refresh: bool,
    pub user_agents: Vec<String>,
    pub selectors: DetailSelectors,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        EnrichSettings {
            worker_count: 10,
            jitter_min_ms: 1_500,
            jitter_max_ms: 4_000,
            task_timeout_ms: 30_000,
            force_refresh: false,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            selectors: DetailSelectors::default(),
        }
    }
}

impl EnrichSettings {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }
}

/// CSS selectors for fields on a product page.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetailSelectors {
    pub description_container: String,
    pub description_text: String,
    pub size_label: String,
    pub structured_data: String,
}

impl Default for DetailSelectors {
    fn default() -> Self {
        DetailSelectors {
            description_container: r#"div[data-test-id="pdp-product-description"]"#.to_string(),
            description_text: "div".to_string(),
            size_label: r#"span[data-content="size-value"]"#.to_string(),
            structured_data: r#"script[type="application/ld+json"]"#.to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then `scraper.toml` (or `path`) if present, then `SCRAPER_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| ScrapeError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.discover;
        let e = &self.enrich;

        if url::Url::parse(&d.listing_url).is_err() {
            return Err(ScrapeError::Config(format!(
                "discover.listing_url is not an absolute URL: {}",
                d.listing_url
            )));
        }
        if d.max_patience == 0 {
            return Err(ScrapeError::Config("discover.max_patience must be at least 1".into()));
        }
        if d.max_probes < d.max_patience {
            return Err(ScrapeError::Config(format!(
                "discover.max_probes ({}) must be >= discover.max_patience ({})",
                d.max_probes, d.max_patience
            )));
        }
        if d.poll_interval_ms == 0 {
            return Err(ScrapeError::Config("discover.poll_interval_ms must be at least 1".into()));
        }
        if e.worker_count == 0 {
            return Err(ScrapeError::Config("enrich.worker_count must be at least 1".into()));
        }
        if e.jitter_min_ms > e.jitter_max_ms {
            return Err(ScrapeError::Config(format!(
                "enrich.jitter_min_ms ({}) exceeds enrich.jitter_max_ms ({})",
                e.jitter_min_ms, e.jitter_max_ms
            )));
        }
        if e.user_agents.is_empty() {
            return Err(ScrapeError::Config("enrich.user_agents must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.enrich.worker_count, 10);
        assert_eq!(s.discover.max_patience, 7);
        assert!(!s.enrich.force_refresh);
    }

    #[test]
    fn rejects_inverted_jitter() {
        let mut s = Settings::default();
        s.enrich.jitter_min_ms = 5_000;
        s.enrich.jitter_max_ms = 1_000;
        assert!(matches!(s.validate(), Err(ScrapeError::Config(_))));
    }

    #[test]
    fn rejects_probe_cap_below_patience() {
        let mut s = Settings::default();
        s.discover.max_probes = 3;
        assert!(matches!(s.validate(), Err(ScrapeError::Config(_))));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let mut s = Settings::default();
        s.discover.poll_interval_ms = 0;
        assert!(matches!(s.validate(), Err(ScrapeError::Config(_))));
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraper.toml");
        std::fs::write(
            &path,
            "[enrich]\nworker_count = 4\nforce_refresh = true\n\n[discover]\nmax_patience = 3\n",
        )
        .unwrap();

        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.enrich.worker_count, 4);
        assert!(s.enrich.force_refresh);
        assert_eq!(s.discover.max_patience, 3);
        assert_eq!(s.enrich.jitter_max_ms, 4_000);
        assert_eq!(s.store.db_path, PathBuf::from("data/products.sqlite"));
    }
}
