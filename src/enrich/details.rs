use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::Result;
use crate::html::{compile, element_text};
use crate::record::ProductDetails;
use crate::settings::DetailSelectors;
use crate::text;

/// Pulls description, sizes and rating out of a product page.
///
/// Every field is looked up on its own; a missing or malformed source for one
/// never affects the others.
pub struct DetailExtractor {
    description_container: Selector,
    description_text: Selector,
    size_label: Selector,
    structured_data: Selector,
}

impl DetailExtractor {
    pub fn new(selectors: &DetailSelectors) -> Result<Self> {
        Ok(DetailExtractor {
            description_container: compile(
                "description_container",
                &selectors.description_container,
            )?,
            description_text: compile("description_text", &selectors.description_text)?,
            size_label: compile("size_label", &selectors.size_label)?,
            structured_data: compile("structured_data", &selectors.structured_data)?,
        })
    }

    pub fn extract(&self, html: &str) -> ProductDetails {
        let doc = Html::parse_document(html);
        let ld_blocks = self.structured_blocks(&doc);
        let rating = ld_blocks.iter().find_map(aggregate_rating);

        ProductDetails {
            description: self.description(&doc),
            sizes: self.sizes(&doc),
            rating: rating.and_then(rating_value),
            review_count: rating.and_then(review_count),
        }
    }

    fn description(&self, doc: &Html) -> Option<String> {
        let container = doc.select(&self.description_container).next()?;
        container
            .select(&self.description_text)
            .find_map(element_text)
    }

    fn sizes(&self, doc: &Html) -> Vec<String> {
        doc.select(&self.size_label)
            .filter_map(element_text)
            .collect()
    }

    /// Parsed JSON-LD blocks; unparsable ones are dropped.
    fn structured_blocks(&self, doc: &Html) -> Vec<Value> {
        doc.select(&self.structured_data)
            .filter_map(|script| {
                let raw: String = script.text().collect();
                match serde_json::from_str(raw.trim()) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::debug!("skipping malformed structured data: {}", e);
                        None
                    }
                }
            })
            .collect()
    }
}

fn aggregate_rating(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(aggregate_rating),
        Value::Object(map) => map
            .get("aggregateRating")
            .filter(|v| v.is_object())
            .or_else(|| map.get("@graph").and_then(aggregate_rating)),
        _ => None,
    }
}

fn rating_value(rating: &Value) -> Option<String> {
    match rating.get("ratingValue")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => text::clean(s),
        _ => None,
    }
}

fn review_count(rating: &Value) -> Option<u32> {
    let raw = rating.get("reviewCount").or_else(|| rating.get("ratingCount"))?;
    match raw {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}
