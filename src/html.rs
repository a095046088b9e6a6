use scraper::{ElementRef, Selector};

use crate::error::{Result, ScrapeError};
use crate::text;

pub fn compile(name: &str, css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| ScrapeError::Config(format!("selector {} ({:?}) is invalid: {:?}", name, css, e)))
}

/// Whitespace-normalized text content of an element, if it has any.
pub fn element_text(el: ElementRef<'_>) -> Option<String> {
    text::clean(&el.text().collect::<Vec<_>>().join(" "))
}
