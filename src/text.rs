use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?$").unwrap());

const CURRENCY_MARKS: &[&str] = &["₹", "Rs.", "Rs", "INR"];

/// Collapse runs of whitespace to one space and trim. Empty results become `None`.
pub fn clean(text: &str) -> Option<String> {
    let collapsed = WHITESPACE_RE.replace_all(text.trim(), " ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.into_owned())
    }
}

/// A single price or rating: `"₹4,999"` → `4999.0`. Anything that is not
/// exactly one number once currency marks and commas are gone is `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let token = strip_currency(raw).replace(',', "");
    if !NUMBER_RE.is_match(&token) {
        return None;
    }
    token.parse().ok()
}

fn strip_currency(raw: &str) -> &str {
    let mut s = raw.trim();
    loop {
        let before = s.len();
        for mark in CURRENCY_MARKS {
            s = s.strip_prefix(mark).unwrap_or(s).trim_start();
            s = s.strip_suffix(mark).unwrap_or(s).trim_end();
        }
        if s.len() == before {
            return s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_whitespace() {
        assert_eq!(clean("  Soft\n\n  foam\tmidsole "), Some("Soft foam midsole".to_string()));
        assert_eq!(clean(" \n\t "), None);
    }

    #[test]
    fn parses_rupee_prices() {
        assert_eq!(parse_number("₹4,999"), Some(4999.0));
        assert_eq!(parse_number("₹ 12,34,999.50"), Some(1234999.5));
        assert_eq!(parse_number("Rs. 2,299"), Some(2299.0));
        assert_eq!(parse_number("Rs.2,299"), Some(2299.0));
        assert_eq!(parse_number("INR 1,499.00"), Some(1499.0));
        assert_eq!(parse_number("2,299 INR"), Some(2299.0));
    }

    #[test]
    fn two_prices_in_one_cell_is_none() {
        assert_eq!(parse_number("₹4,999 ₹2,499"), None);
        assert_eq!(parse_number("₹4,999-₹5,499"), None);
    }

    #[test]
    fn unparsable_price_is_none() {
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("Sold out"), None);
    }

    #[test]
    fn ratings_parse_as_decimals() {
        assert_eq!(parse_number("4.5"), Some(4.5));
        assert_eq!(parse_number("4"), Some(4.0));
        assert_eq!(parse_number("4.5 out of 5"), None);
    }
}
