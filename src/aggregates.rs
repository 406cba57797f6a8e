// 🧮 Aggregate Calculator - derived money fields on a materialized tree
//
// Formulas:
//   subtotal = Σ amount × price over every line-item collection
//   total    = (subtotal - discount) × (1 + 0.16 if include_iva)
//   earnings = works_total - orders_total
//
// Nothing here is persisted and nothing here fails: missing or malformed
// inputs count as zero, and arithmetic saturates at `Decimal::MAX`
// instead of overflowing.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::db::Record;
use crate::money::{self, TAX_RATE};
use crate::schema::{EntityKind, EntitySchema};

// ============================================================================
// LINE TOTALS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Totals {
    pub subtotal: Decimal,
    /// After discount, before tax
    pub pre_tax_total: Decimal,
    pub total: Decimal,
}

fn decimal_field(record: &Record, field: &str) -> Decimal {
    record
        .get(field)
        .and_then(money::parse_money)
        .unwrap_or(Decimal::ZERO)
}

fn items<'r>(record: &'r Record, field: &str) -> impl Iterator<Item = &'r Record> {
    record
        .get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

pub fn compute_totals(schema: &EntitySchema, record: &Record) -> Totals {
    let subtotal = schema
        .line_item_collections()
        .flat_map(|collection| items(record, collection.field))
        .map(|line| decimal_field(line, "amount").saturating_mul(decimal_field(line, "price")))
        .fold(Decimal::ZERO, Decimal::saturating_add);

    let pre_tax_total = subtotal.saturating_sub(decimal_field(record, "discount"));
    let include_iva = record
        .get("include_iva")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let total = if include_iva {
        pre_tax_total.saturating_add(pre_tax_total.saturating_mul(TAX_RATE))
    } else {
        pre_tax_total
    };

    Totals {
        subtotal,
        pre_tax_total,
        total,
    }
}

// ============================================================================
// BATCH TOTALS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchTotals {
    pub orders_number: usize,
    pub works_number: usize,
    pub orders_total: Decimal,
    pub works_total: Decimal,
    pub earnings: Decimal,
}

/// Totals are recomputed from each member's lines, never read back from
/// already rounded member totals
pub fn compute_batch(schema: &EntitySchema, record: &Record) -> BatchTotals {
    let mut batch = BatchTotals::default();

    for collection in schema.children {
        let member = collection.child.schema();
        if !member.has_line_items() {
            continue;
        }
        for item in items(record, collection.field) {
            let total = compute_totals(member, item).total;
            match collection.child {
                EntityKind::Work => {
                    batch.works_number += 1;
                    batch.works_total = batch.works_total.saturating_add(total);
                }
                _ => {
                    batch.orders_number += 1;
                    batch.orders_total = batch.orders_total.saturating_add(total);
                }
            }
        }
    }

    batch.earnings = batch.works_total.saturating_sub(batch.orders_total);
    batch
}

/// `prefix + id`, e.g. "WB12". A batch without an expanded organization has
/// no display number.
pub fn batch_number(record: &Record) -> Option<String> {
    let id = record.get("id").and_then(Value::as_i64)?;
    let organization = record.get("organization")?.as_object()?;
    let prefix = organization
        .get("prefix")
        .and_then(Value::as_str)
        .unwrap_or("");
    Some(format!("{}{}", prefix, id))
}

// ============================================================================
// DECORATION
// ============================================================================

/// Add every computed field to a materialized tree, members first
pub fn decorate(schema: &EntitySchema, record: &mut Record) {
    let number = if schema.is_batch() {
        batch_number(record)
    } else {
        None
    };
    let customer = record.get("customer").cloned();

    for collection in schema.children {
        let child = collection.child.schema();
        let Some(Value::Array(members)) = record.get_mut(collection.field) else {
            continue;
        };
        for member in members.iter_mut().filter_map(Value::as_object_mut) {
            if schema.is_batch() {
                if let Some(number) = &number {
                    member.insert(
                        format!("{}_number", collection.parent_field()),
                        Value::String(number.clone()),
                    );
                }
                if collection.child == EntityKind::Work {
                    member.insert("customer".to_string(), customer.clone().unwrap_or(Value::Null));
                }
            }
            decorate(child, member);
        }
    }

    if schema.has_line_items() {
        let totals = compute_totals(schema, record);
        record.insert("subtotal".to_string(), money::money_json(totals.subtotal));
        record.insert("total".to_string(), money::money_json(totals.total));
    }

    if schema.is_batch() {
        decorate_batch(schema, record, number);
    }

    match schema.kind {
        EntityKind::Order => {
            for field in ["workbuy", "storagebuy"] {
                let key = format!("{}_number", field);
                if record.contains_key(&key) {
                    continue;
                }
                let number = record
                    .get(field)
                    .and_then(Value::as_object)
                    .and_then(batch_number);
                if let Some(number) = number {
                    record.insert(key, Value::String(number));
                }
            }
        }
        EntityKind::Work if !record.contains_key("customer") => {
            let customer = record
                .get("workbuy")
                .and_then(|wb| wb.get("customer"))
                .cloned()
                .unwrap_or(Value::Null);
            record.insert("customer".to_string(), customer);
        }
        EntityKind::Provider => products_amount(record, "provider_products"),
        EntityKind::Customer => products_amount(record, "customer_products"),
        _ => {}
    }
}

fn decorate_batch(schema: &EntitySchema, record: &mut Record, number: Option<String>) {
    let batch = compute_batch(schema, record);
    let has_works = schema.children.iter().any(|c| c.child == EntityKind::Work);

    if let Some(number) = number {
        record.insert("number".to_string(), Value::String(number));
    }
    record.insert("orders_number".to_string(), Value::from(batch.orders_number));
    record.insert("orders_total".to_string(), money::money_json(batch.orders_total));
    record.insert("total".to_string(), money::money_json(batch.orders_total));

    if has_works {
        record.insert("works_number".to_string(), Value::from(batch.works_number));
        record.insert("works_total".to_string(), money::money_json(batch.works_total));
        record.insert("earnings".to_string(), money::money_json(batch.earnings));
    }
}

fn products_amount(record: &mut Record, field: &str) {
    let count = items(record, field).count();
    record.insert("products_amount".to_string(), Value::from(count));
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_work_totals_with_discount_and_tax() {
        let work = record(json!({
            "discount": 5.0,
            "include_iva": true,
            "work_unregisteredproducts": [
                {"amount": 3, "price": 10.0},
                {"amount": 2, "price": 5.0},
            ],
        }));

        let totals = compute_totals(EntityKind::Work.schema(), &work);
        assert_eq!(totals.subtotal, dec("40.00"));
        assert_eq!(totals.pre_tax_total, dec("35.00"));
        assert_eq!(totals.total, dec("40.60"));
        println!("✅ subtotal {} → total {}", totals.subtotal, totals.total);
    }

    #[test]
    fn test_every_line_collection_counts_and_null_price_is_zero() {
        let order = record(json!({
            "order_provider_products": [{"amount": 2, "price": 2.5}],
            "order_unregisteredproducts": [
                {"amount": 4, "price": null},
                {"amount": 1, "price": "1.25"},
            ],
            "payments": [{"amount": 1000}],
        }));

        let totals = compute_totals(EntityKind::Order.schema(), &order);
        assert_eq!(totals.subtotal, dec("6.25"));
        assert_eq!(totals.total, dec("6.25"));
    }

    #[test]
    fn test_discount_can_push_total_negative() {
        let order = record(json!({
            "discount": 10,
            "order_unregisteredproducts": [{"amount": 1, "price": 4}],
        }));
        let totals = compute_totals(EntityKind::Order.schema(), &order);
        assert_eq!(totals.total, dec("-6"));
    }

    #[test]
    fn test_oversized_lines_saturate_instead_of_panicking() {
        let work = record(json!({
            "include_iva": true,
            "discount": "-100000000000000000000",
            "work_unregisteredproducts": [
                {"amount": 1000000000, "price": "100000000000000000000"},
                {"amount": 1000000000, "price": "100000000000000000000"},
            ],
        }));
        let totals = compute_totals(EntityKind::Work.schema(), &work);
        assert_eq!(totals.subtotal, Decimal::MAX);
        assert_eq!(totals.total, Decimal::MAX);

        let mut workbuy = record(json!({
            "id": 1,
            "orders": [{"order_unregisteredproducts": [{"amount": 1000000000, "price": "100000000000000000000"}]}],
            "works": [
                {"work_products": [{"amount": 1000000000, "price": "100000000000000000000"}]},
                {"work_products": [{"amount": 1000000000, "price": "100000000000000000000"}]},
            ],
        }));
        let batch = compute_batch(EntityKind::WorkBuy.schema(), &workbuy);
        assert_eq!(batch.works_total, Decimal::MAX);
        assert_eq!(batch.earnings, Decimal::ZERO);

        decorate(EntityKind::WorkBuy.schema(), &mut workbuy);
        assert!(workbuy["works_total"].is_number());
    }

    #[test]
    fn test_batch_earnings() {
        let workbuy = record(json!({
            "id": 12,
            "organization": {"id": 1, "prefix": "WB"},
            "customer": {"id": 3, "name": "ACME"},
            "orders": [{"order_unregisteredproducts": [{"amount": 1, "price": 100}]}],
            "works": [{"work_products": [{"amount": 3, "price": 50}]}],
        }));

        let batch = compute_batch(EntityKind::WorkBuy.schema(), &workbuy);
        assert_eq!(batch.orders_total, dec("100"));
        assert_eq!(batch.works_total, dec("150"));
        assert_eq!(batch.earnings, dec("50"));
        assert_eq!((batch.orders_number, batch.works_number), (1, 1));
    }

    #[test]
    fn test_decorate_workbuy_tree() {
        let mut workbuy = record(json!({
            "id": 12,
            "organization": {"id": 1, "prefix": "WB"},
            "customer": {"id": 3, "name": "ACME"},
            "orders": [{"id": 1, "workbuy_id": 12, "order_unregisteredproducts": [{"amount": 1, "price": 100}]}],
            "works": [{"id": 2, "workbuy_id": 12, "include_iva": true, "work_products": [{"amount": 1, "price": 10}]}],
        }));

        decorate(EntityKind::WorkBuy.schema(), &mut workbuy);

        assert_eq!(workbuy["number"], json!("WB12"));
        assert_eq!(workbuy["orders_number"], json!(1));
        assert_eq!(workbuy["works_number"], json!(1));
        assert_eq!(workbuy["total"], json!(100.0));
        assert_eq!(workbuy["works_total"], json!(11.6));
        assert_eq!(workbuy["earnings"], json!(-88.4));

        assert_eq!(workbuy["orders"][0]["workbuy_number"], json!("WB12"));
        assert_eq!(workbuy["orders"][0]["subtotal"], json!(100.0));
        assert_eq!(workbuy["works"][0]["customer"]["name"], json!("ACME"));
        assert_eq!(workbuy["works"][0]["total"], json!(11.6));
    }

    #[test]
    fn test_empty_batch() {
        let mut storagebuy = record(json!({
            "id": 4,
            "organization": {"id": 1, "prefix": null},
        }));

        decorate(EntityKind::StorageBuy.schema(), &mut storagebuy);

        assert_eq!(storagebuy["number"], json!("4"));
        assert_eq!(storagebuy["orders_number"], json!(0));
        assert_eq!(storagebuy["total"], json!(0.0));
        assert!(storagebuy.get("earnings").is_none());
    }

    #[test]
    fn test_standalone_order_and_work_display_fields() {
        let mut order = record(json!({
            "id": 7,
            "workbuy": {"id": 12, "organization": {"prefix": "WB"}},
            "storagebuy": null,
        }));
        decorate(EntityKind::Order.schema(), &mut order);
        assert_eq!(order["workbuy_number"], json!("WB12"));
        assert!(order.get("storagebuy_number").is_none());
        assert_eq!(order["subtotal"], json!(0.0));

        let mut work = record(json!({
            "id": 9,
            "workbuy_id": 12,
            "workbuy": {"id": 12, "customer": {"id": 3, "name": "ACME"}},
        }));
        decorate(EntityKind::Work.schema(), &mut work);
        assert_eq!(work["customer"]["id"], json!(3));
    }

    #[test]
    fn test_products_amount() {
        let mut provider = record(json!({"id": 1, "provider_products": [{"id": 1}, {"id": 2}]}));
        decorate(EntityKind::Provider.schema(), &mut provider);
        assert_eq!(provider["products_amount"], json!(2));

        let mut customer = record(json!({"id": 1}));
        decorate(EntityKind::Customer.schema(), &mut customer);
        assert_eq!(customer["products_amount"], json!(0));
    }
}
