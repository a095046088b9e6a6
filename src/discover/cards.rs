use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::html::{compile, element_text};
use crate::record::BasicRecord;
use crate::settings::ListingSelectors;

pub struct CardExtractor {
    card: Selector,
    link: Selector,
    name: Selector,
    image: Selector,
    full_price: Selector,
    discounted_price: Selector,
}

impl CardExtractor {
    pub fn new(selectors: &ListingSelectors) -> Result<Self> {
        Ok(CardExtractor {
            card: compile("card", &selectors.card)?,
            link: compile("link", &selectors.link)?,
            name: compile("name", &selectors.name)?,
            image: compile("image", &selectors.image)?,
            full_price: compile("full_price", &selectors.full_price)?,
            discounted_price: compile("discounted_price", &selectors.discounted_price)?,
        })
    }

    /// One record per card whose link resolves to an absolute URL, in page order.
    pub fn extract(&self, html: &str, base: &Url) -> Vec<BasicRecord> {
        let doc = Html::parse_document(html);
        doc.select(&self.card)
            .enumerate()
            .filter_map(|(i, card)| {
                let record = self.card_record(card, base);
                if record.is_none() {
                    debug!("card {} has no resolvable link, skipped", i);
                }
                record
            })
            .collect()
    }

    fn card_record(&self, card: ElementRef<'_>, base: &Url) -> Option<BasicRecord> {
        let href = card.select(&self.link).next()?.value().attr("href")?;
        let url = resolve(base, href)?;

        let image_url = card
            .select(&self.image)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| resolve(base, src).unwrap_or_else(|| src.trim().to_string()))
            .filter(|src| !src.is_empty());

        Some(BasicRecord {
            url,
            name: first_text(card, &self.name),
            image_url,
            full_price: first_text(card, &self.full_price),
            discounted_price: first_text(card, &self.discounted_price),
        })
    }
}

fn first_text(card: ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector).next().and_then(element_text)
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}
