// ⚖️ Reconciliation Engine - make persisted children match a payload
//
// For one parent and one owned collection:
//
//   1. entries with an id are updated in place (they must already belong
//      to this parent, never re-parented)
//   2. entries without an id are inserted under the parent
//   3. nested collections on each entry are reconciled the same way
//   4. persisted children not named by the payload are deleted
//
// Deletion runs only after every entry has been written, so a payload can
// never delete a row it also updates.

use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::db::{self, Record};
use crate::error::{BackofficeError, Result};
use crate::schema::{ChildCollection, EntitySchema};

/// Buy → order/work → line item
pub const MAX_NESTING_DEPTH: usize = 2;

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub field: String,
    pub created: Vec<i64>,
    pub updated: Vec<i64>,
    pub deleted: Vec<i64>,
    /// One report per nested collection touched below this one
    pub nested: Vec<ReconciliationReport>,
}

impl ReconciliationReport {
    fn new(field: &str) -> Self {
        ReconciliationReport {
            field: field.to_string(),
            ..Default::default()
        }
    }

    /// Ids that survive the reconciliation, ascending
    pub fn kept(&self) -> Vec<i64> {
        let mut kept: Vec<i64> = self.created.iter().chain(&self.updated).copied().collect();
        kept.sort_unstable();
        kept.dedup();
        kept
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} created, {} updated, {} deleted",
            self.field,
            self.created.len(),
            self.updated.len(),
            self.deleted.len()
        )
    }
}

// ============================================================================
// PAYLOAD SPLITTING
// ============================================================================

/// A collection from a payload, paired with its declaration
pub type CollectionPayload = (&'static ChildCollection, Vec<Record>);

/// Separate scalar fields from owned collections, keeping the collections
/// in declaration order
pub fn split_collections(schema: &EntitySchema, mut record: Record) -> (Record, Vec<CollectionPayload>) {
    let mut collections = Vec::new();

    for collection in schema.children {
        if let Some(value) = record.remove(collection.field) {
            let items = match value {
                Value::Array(items) => items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(map),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            collections.push((collection, items));
        }
    }

    (record, collections)
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine<'c> {
    conn: &'c Connection,
}

impl<'c> ReconciliationEngine<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        ReconciliationEngine { conn }
    }

    /// Reconcile `parent.field` for row `parent_id` against `payloads`
    pub fn reconcile(
        &self,
        parent: &EntitySchema,
        parent_id: i64,
        field: &str,
        payloads: &[Record],
    ) -> Result<ReconciliationReport> {
        self.reconcile_at(parent, parent_id, field, payloads, 1)
    }

    /// Reconcile every collection of a split payload, in order
    pub fn reconcile_all(
        &self,
        parent: &EntitySchema,
        parent_id: i64,
        collections: &[CollectionPayload],
    ) -> Result<Vec<ReconciliationReport>> {
        collections
            .iter()
            .map(|(collection, items)| self.reconcile(parent, parent_id, collection.field, items))
            .collect()
    }

    fn reconcile_at(
        &self,
        parent: &EntitySchema,
        parent_id: i64,
        field: &str,
        payloads: &[Record],
        depth: usize,
    ) -> Result<ReconciliationReport> {
        if depth > MAX_NESTING_DEPTH {
            return Err(BackofficeError::validation(format!(
                "'{}' is nested deeper than {} levels",
                field, MAX_NESTING_DEPTH
            )));
        }

        let collection = parent.child(field).ok_or_else(|| {
            BackofficeError::validation(format!("{} has no collection '{}'", parent.name(), field))
        })?;
        let child = collection.child.schema();
        let fk = collection.foreign_key;

        debug!(
            "reconciling {}[{}].{} with {} entries",
            parent.name(),
            parent_id,
            field,
            payloads.len()
        );

        let mut report = ReconciliationReport::new(field);
        let mut keep = HashSet::new();

        for payload in payloads {
            let (mut scalars, nested) = split_collections(child, payload.clone());

            let child_id = match scalars.remove("id").and_then(|v| v.as_i64()) {
                Some(id) => {
                    self.ensure_owned(child, fk, parent_id, id)?;
                    scalars.remove(fk);
                    db::update_record(self.conn, child, id, &scalars)?;
                    report.updated.push(id);
                    id
                }
                None => {
                    scalars.insert(fk.to_string(), Value::from(parent_id));
                    let id = db::insert_record(self.conn, child, &scalars)?;
                    report.created.push(id);
                    id
                }
            };
            keep.insert(child_id);

            for (sub_collection, items) in &nested {
                let sub = self.reconcile_at(child, child_id, sub_collection.field, items, depth + 1)?;
                report.nested.push(sub);
            }
        }

        for existing in db::child_ids(self.conn, child, fk, parent_id)? {
            if !keep.contains(&existing) {
                db::delete_record(self.conn, child, existing)?;
                report.deleted.push(existing);
            }
        }

        if !report.created.is_empty() || !report.deleted.is_empty() {
            info!("{}[{}] {}", parent.name(), parent_id, report.summary());
        }

        Ok(report)
    }

    /// `NotFound` unless row `id` exists and its owning key is `parent_id`
    fn ensure_owned(&self, child: &EntitySchema, fk: &str, parent_id: i64, id: i64) -> Result<()> {
        let row = db::fetch_record(self.conn, child, id)?
            .ok_or_else(|| BackofficeError::not_found(child.name(), id))?;

        if row.get(fk).and_then(|v| v.as_i64()) != Some(parent_id) {
            debug!(
                "{} {} belongs to another parent, refusing to move it",
                child.name(),
                id
            );
            return Err(BackofficeError::not_found(child.name(), id));
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, fetch_record, insert_record, setup_database};
    use crate::schema::EntityKind;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn records(value: Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn create_provider(conn: &Connection, name: &str) -> i64 {
        insert_record(conn, EntityKind::Provider.schema(), &record(json!({"name": name}))).unwrap()
    }

    /// WorkBuy with its customer and organization, plus a provider and a
    /// taxpayer for orders
    fn create_workbuy(conn: &Connection) -> (i64, i64, i64) {
        let customer = insert_record(conn, EntityKind::Customer.schema(), &record(json!({"name": "ACME"}))).unwrap();
        let org = insert_record(conn, EntityKind::Organization.schema(), &record(json!({"name": "Org", "prefix": "WB"}))).unwrap();
        let workbuy = insert_record(
            conn,
            EntityKind::WorkBuy.schema(),
            &record(json!({"customer_id": customer, "organization_id": org})),
        )
        .unwrap();
        let provider = create_provider(conn, "Refacciones");
        let taxpayer = insert_record(conn, EntityKind::TaxPayer.schema(), &record(json!({"name": "T", "key": "K"}))).unwrap();
        (workbuy, provider, taxpayer)
    }

    #[test]
    fn test_create_then_exact_set() {
        let conn = setup();
        let engine = ReconciliationEngine::new(&conn);
        let provider = create_provider(&conn, "P");
        let schema = EntityKind::Provider.schema();

        let first = engine
            .reconcile(
                schema,
                provider,
                "contacts",
                &records(json!([{"name": "Ana"}, {"name": "Luis"}])),
            )
            .unwrap();
        assert_eq!(first.created.len(), 2);
        assert!(first.deleted.is_empty());

        // Keep Ana (renamed), drop Luis, add Eva
        let ana = first.created[0];
        let luis = first.created[1];
        let second = engine
            .reconcile(
                schema,
                provider,
                "contacts",
                &records(json!([{"id": ana, "name": "Ana María"}, {"name": "Eva"}])),
            )
            .unwrap();

        assert_eq!(second.updated, vec![ana]);
        assert_eq!(second.deleted, vec![luis]);
        assert_eq!(second.created.len(), 1);

        let ids = db::child_ids(&conn, EntityKind::ProviderContact.schema(), "provider_id", provider).unwrap();
        assert_eq!(ids, second.kept());

        let row = fetch_record(&conn, EntityKind::ProviderContact.schema(), ana).unwrap().unwrap();
        assert_eq!(row["name"], json!("Ana María"));
        println!("✅ {}", second.summary());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let conn = setup();
        let engine = ReconciliationEngine::new(&conn);
        let provider = create_provider(&conn, "P");
        let schema = EntityKind::Provider.schema();

        let first = engine
            .reconcile(schema, provider, "contacts", &records(json!([{"name": "A"}, {"name": "B"}])))
            .unwrap();

        let again: Vec<Record> = first
            .created
            .iter()
            .zip(["A", "B"])
            .map(|(id, name)| record(json!({"id": id, "name": name})))
            .collect();

        let second = engine.reconcile(schema, provider, "contacts", &again).unwrap();
        let third = engine.reconcile(schema, provider, "contacts", &again).unwrap();

        assert!(second.created.is_empty() && second.deleted.is_empty());
        assert_eq!(second, third);
        assert_eq!(count_rows(&conn, EntityKind::ProviderContact.schema()).unwrap(), 2);
    }

    #[test]
    fn test_empty_payload_deletes_all() {
        let conn = setup();
        let engine = ReconciliationEngine::new(&conn);
        let provider = create_provider(&conn, "P");
        let schema = EntityKind::Provider.schema();

        engine
            .reconcile(schema, provider, "contacts", &records(json!([{"name": "A"}])))
            .unwrap();
        let report = engine.reconcile(schema, provider, "contacts", &[]).unwrap();

        assert_eq!(report.deleted.len(), 1);
        assert_eq!(count_rows(&conn, EntityKind::ProviderContact.schema()).unwrap(), 0);
    }

    #[test]
    fn test_foreign_child_is_not_found_and_not_moved() {
        let conn = setup();
        let engine = ReconciliationEngine::new(&conn);
        let schema = EntityKind::Provider.schema();
        let p1 = create_provider(&conn, "P1");
        let p2 = create_provider(&conn, "P2");

        let theirs = engine
            .reconcile(schema, p2, "contacts", &records(json!([{"name": "Other"}])))
            .unwrap()
            .created[0];

        let err = engine
            .reconcile(schema, p1, "contacts", &records(json!([{"id": theirs, "name": "Stolen"}])))
            .unwrap_err();
        assert!(matches!(err, BackofficeError::NotFound(_)));

        let err = engine
            .reconcile(schema, p1, "contacts", &records(json!([{"id": 999, "name": "Ghost"}])))
            .unwrap_err();
        assert!(matches!(err, BackofficeError::NotFound(_)));

        let row = fetch_record(&conn, EntityKind::ProviderContact.schema(), theirs).unwrap().unwrap();
        assert_eq!(row["provider_id"], json!(p2));
        assert_eq!(row["name"], json!("Other"));
    }

    #[test]
    fn test_missing_required_column_is_integrity() {
        let conn = setup();
        let engine = ReconciliationEngine::new(&conn);
        let provider = create_provider(&conn, "P");

        let err = engine
            .reconcile(
                EntityKind::Provider.schema(),
                provider,
                "contacts",
                &records(json!([{"department": "no name"}])),
            )
            .unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_two_level_nesting() {
        let conn = setup();
        let engine = ReconciliationEngine::new(&conn);
        let (workbuy, provider, taxpayer) = create_workbuy(&conn);
        let schema = EntityKind::WorkBuy.schema();

        let orders = records(json!([{
            "provider_id": provider,
            "taxpayer_id": taxpayer,
            "order_unregisteredproducts": [
                {"description": "bolt", "amount": 3, "price": "1.00"},
                {"description": "nut", "amount": 2, "price": "0.50"},
            ],
        }]));

        let report = engine.reconcile(schema, workbuy, "orders", &orders).unwrap();
        let order = report.created[0];
        assert_eq!(report.nested.len(), 1);
        assert_eq!(report.nested[0].created.len(), 2);

        // Partial update: drop one line, other collections untouched
        let bolt = report.nested[0].created[0];
        let update = records(json!([{
            "id": order,
            "comment": "trimmed",
            "order_unregisteredproducts": [{"id": bolt, "amount": 4}],
        }]));
        let report = engine.reconcile(schema, workbuy, "orders", &update).unwrap();

        assert_eq!(report.updated, vec![order]);
        assert_eq!(report.nested[0].deleted.len(), 1);
        let line = fetch_record(&conn, EntityKind::OrderUnregisteredProduct.schema(), bolt).unwrap().unwrap();
        assert_eq!(line["amount"], json!(4));
        assert_eq!(line["description"], json!("bolt"));
    }

    #[test]
    fn test_unknown_collection_is_validation_error() {
        let conn = setup();
        let engine = ReconciliationEngine::new(&conn);
        let provider = create_provider(&conn, "P");

        let err = engine
            .reconcile(EntityKind::Provider.schema(), provider, "payments", &[])
            .unwrap_err();
        assert!(matches!(err, BackofficeError::Validation(_)));
    }

    #[test]
    fn test_split_collections_keeps_declaration_order() {
        let payload = record(json!({
            "comment": "x",
            "payments": [{"amount": 1}],
            "work_employees": [],
            "work_products": [{"amount": 1}, 5],
        }));

        let (scalars, collections) = split_collections(EntityKind::Work.schema(), payload);
        let fields: Vec<_> = collections.iter().map(|(c, _)| c.field).collect();

        assert_eq!(fields, vec!["work_products", "work_employees", "payments"]);
        assert_eq!(collections[0].1.len(), 1);
        assert_eq!(scalars.len(), 1);
    }
}
