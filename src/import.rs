// 📥 Product Import - catalogue CSV → products
//
// Columns: code,name,description,brand,appliance
//
// Rows are matched by `code`: known codes are updated, new ones inserted.
// Brand and appliance names go through the normalizer's get-or-create, so
// importing the same file twice creates nothing new.

use anyhow::Context;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use crate::db::{self, Record};
use crate::error::{BackofficeError, Result};
use crate::resources::{create_in, update_in};
use crate::schema::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductRow {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub appliance: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
}

pub fn load_product_csv(csv_path: &Path) -> anyhow::Result<Vec<ProductRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for (index, result) in rdr.deserialize().enumerate() {
        // +2: header line, 1-based
        let row: ProductRow =
            result.with_context(|| format!("Failed to read product on line {}", index + 2))?;
        rows.push(row);
    }

    Ok(rows)
}

impl ProductRow {
    fn payload(&self) -> Record {
        let mut payload = Record::new();
        payload.insert("code".to_string(), Value::from(self.code.as_str()));
        payload.insert("name".to_string(), Value::from(self.name.as_str()));
        if let Some(description) = &self.description {
            payload.insert("description".to_string(), Value::from(description.as_str()));
        }
        if let Some(brand) = &self.brand {
            payload.insert("brand_name".to_string(), Value::from(brand.as_str()));
        }
        if let Some(appliance) = &self.appliance {
            payload.insert("appliance_name".to_string(), Value::from(appliance.as_str()));
        }
        payload
    }
}

/// All rows in one transaction; one bad row imports nothing
pub fn import_products(conn: &mut Connection, rows: &[ProductRow]) -> Result<ImportSummary> {
    let schema = EntityKind::Product.schema();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut summary = ImportSummary::default();

    for row in rows {
        if row.code.is_empty() {
            return Err(BackofficeError::validation(format!(
                "product '{}' has no code",
                row.name
            )));
        }

        match db::find_id_by(&tx, schema, "code", &row.code)? {
            Some(id) => {
                update_in(&tx, schema, id, &row.payload())?;
                summary.updated += 1;
            }
            None => {
                create_in(&tx, schema, &row.payload())?;
                summary.inserted += 1;
            }
        }
        debug!("imported product {}", row.code);
    }

    tx.commit()?;
    info!(
        "product import: {} inserted, {} updated",
        summary.inserted, summary.updated
    );
    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================
