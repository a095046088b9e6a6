/// Outcome of looking for a detail field on a product page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Field<T> {
    #[default]
    NeverAttempted,
    AttemptedAbsent,
    Present(T),
}

impl<T> Field<T> {
    /// Rebuild a field from its stored column and whether enrichment ever ran.
    pub fn from_column(attempted: bool, value: Option<T>) -> Self {
        match (attempted, value) {
            (_, Some(v)) => Field::Present(v),
            (true, None) => Field::AttemptedAbsent,
            (false, None) => Field::NeverAttempted,
        }
    }

    pub fn present(&self) -> Option<&T> {
        match self {
            Field::Present(v) => Some(v),
            _ => None,
        }
    }
}

/// Fields readable from a listing card alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicRecord {
    pub url: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub full_price: Option<String>,
    pub discounted_price: Option<String>,
}

/// Fields extracted from a product's own page. Each one is found independently.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductDetails {
    pub description: Option<String>,
    pub sizes: Vec<String>,
    pub rating: Option<String>,
    pub review_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    pub url: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub full_price: Option<String>,
    pub discounted_price: Option<String>,
    pub description: Field<String>,
    pub sizes: Field<Vec<String>>,
    pub rating: Field<String>,
    pub review_count: u32,
}
