use std::path::Path;

use rayon::prelude::*;
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::db;
use crate::error::Result;
use crate::record::ProductRecord;
use crate::text::parse_number;

const SIZE_DELIMITER: &str = "|";

/// One row of the exported dataset. Numeric columns are empty when unparsable.
#[derive(Debug, Serialize, PartialEq)]
pub struct DatasetRow {
    pub url: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub full_price: Option<f64>,
    pub discounted_price: Option<f64>,
    pub description: Option<String>,
    pub sizes: Option<String>,
    pub rating: Option<f64>,
    pub review_count: u32,
}

impl From<ProductRecord> for DatasetRow {
    fn from(r: ProductRecord) -> Self {
        DatasetRow {
            full_price: r.full_price.as_deref().and_then(parse_number),
            discounted_price: r.discounted_price.as_deref().and_then(parse_number),
            description: r.description.present().cloned(),
            sizes: r.sizes.present().map(|s| s.join(SIZE_DELIMITER)),
            rating: r.rating.present().and_then(|s| parse_number(s)),
            review_count: r.review_count,
            url: r.url,
            name: r.name,
            image_url: r.image_url,
        }
    }
}

pub fn normalize(records: Vec<ProductRecord>) -> Vec<DatasetRow> {
    records.into_par_iter().map(DatasetRow::from).collect()
}

/// Snapshot the store into a CSV file. Returns the number of rows written.
pub fn export_csv(conn: &Connection, path: &Path) -> Result<usize> {
    let rows = normalize(db::export_all(conn)?);

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        wtr.write_record([
            "url",
            "name",
            "image_url",
            "full_price",
            "discounted_price",
            "description",
            "sizes",
            "rating",
            "review_count",
        ])?;
    }
    for row in &rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;

    info!("Exported {} products to {}", rows.len(), path.display());
    Ok(rows.len())
}
