// 🌳 Tree Materializer - a parent with everything it owns
//
// To-one references are expanded into objects up to two hops away
// (`order.workbuy.organization`), owned collections are nested with the
// same treatment. The reference back to the owning parent is left as a
// plain id inside nested rows.

use rusqlite::Connection;
use serde_json::Value;
use std::collections::HashMap;

use crate::db::{self, Condition, OrderBy, Record};
use crate::error::Result;
use crate::schema::{EntityKind, EntitySchema};

/// How many hops of to-one references get expanded
pub const REFERENCE_DEPTH: usize = 2;

pub fn fetch_tree(conn: &Connection, schema: &EntitySchema, id: i64) -> Result<Option<Record>> {
    TreeBuilder::new(conn).fetch(schema, id)
}

/// Materializes rows, caching referenced rows for the life of one request
pub struct TreeBuilder<'c> {
    conn: &'c Connection,
    cache: HashMap<(EntityKind, i64), Option<Record>>,
}

impl<'c> TreeBuilder<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        TreeBuilder {
            conn,
            cache: HashMap::new(),
        }
    }

    pub fn fetch(&mut self, schema: &EntitySchema, id: i64) -> Result<Option<Record>> {
        match db::fetch_record(self.conn, schema, id)? {
            Some(row) => Ok(Some(self.materialize(schema, row, None)?)),
            None => Ok(None),
        }
    }

    /// Expand references and nest children of an already fetched row
    pub fn materialize(
        &mut self,
        schema: &EntitySchema,
        mut row: Record,
        owner_fk: Option<&str>,
    ) -> Result<Record> {
        self.expand_references(schema, &mut row, owner_fk, REFERENCE_DEPTH)?;

        let id = match row.get("id").and_then(Value::as_i64) {
            Some(id) => id,
            None => return Ok(row),
        };

        for collection in schema.children {
            let child = collection.child.schema();
            let rows = db::fetch_where(
                self.conn,
                child,
                &[Condition::Equals(collection.foreign_key.to_string(), Value::from(id))],
                OrderBy::Natural,
            )?;

            let mut items = Vec::with_capacity(rows.len());
            for child_row in rows {
                let nested = self.materialize(child, child_row, Some(collection.foreign_key))?;
                items.push(Value::Object(nested));
            }
            row.insert(collection.field.to_string(), Value::Array(items));
        }

        Ok(row)
    }

    fn expand_references(
        &mut self,
        schema: &EntitySchema,
        row: &mut Record,
        skip: Option<&str>,
        hops: usize,
    ) -> Result<()> {
        if hops == 0 {
            return Ok(());
        }

        for col in schema.references() {
            if skip == Some(col.name) {
                continue;
            }
            let (Some(field), Some(target)) = (col.reference_field(), col.reference_target())
            else {
                continue;
            };

            let expanded = match row.get(col.name).and_then(Value::as_i64) {
                Some(ref_id) => match self.referenced(target, ref_id)? {
                    Some(mut referenced) => {
                        self.expand_references(target.schema(), &mut referenced, None, hops - 1)?;
                        Value::Object(referenced)
                    }
                    None => Value::Null,
                },
                None => Value::Null,
            };
            row.insert(field.to_string(), expanded);
        }

        Ok(())
    }

    fn referenced(&mut self, kind: EntityKind, id: i64) -> Result<Option<Record>> {
        if let Some(hit) = self.cache.get(&(kind, id)) {
            return Ok(hit.clone());
        }
        let row = db::fetch_record(self.conn, kind.schema(), id)?;
        self.cache.insert((kind, id), row.clone());
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_record, setup_database};
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn insert(conn: &Connection, kind: EntityKind, value: Value) -> i64 {
        insert_record(conn, kind.schema(), &record(value)).unwrap()
    }

    #[test]
    fn test_missing_row_is_none() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        assert!(fetch_tree(&conn, EntityKind::Work.schema(), 1).unwrap().is_none());
    }

    #[test]
    fn test_work_tree_expands_two_hops() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let customer = insert(&conn, EntityKind::Customer, json!({"name": "ACME"}));
        let org = insert(&conn, EntityKind::Organization, json!({"name": "Org", "prefix": "WB"}));
        let workbuy = insert(&conn, EntityKind::WorkBuy, json!({"customer_id": customer, "organization_id": org}));
        let taxpayer = insert(&conn, EntityKind::TaxPayer, json!({"name": "T", "key": "K"}));
        let brand = insert(&conn, EntityKind::Brand, json!({"name": "Bosch"}));
        let product = insert(&conn, EntityKind::Product, json!({"code": "P-1", "name": "Pump", "brand_id": brand}));
        let work = insert(
            &conn,
            EntityKind::Work,
            json!({"number": "W-1", "taxpayer_id": taxpayer, "workbuy_id": workbuy}),
        );
        insert(
            &conn,
            EntityKind::WorkProduct,
            json!({"work_id": work, "product_id": product, "amount": 2, "price": "10"}),
        );

        let tree = fetch_tree(&conn, EntityKind::Work.schema(), work).unwrap().unwrap();

        // hop 1 and hop 2
        assert_eq!(tree["workbuy"]["id"], json!(workbuy));
        assert_eq!(tree["workbuy"]["customer"]["name"], json!("ACME"));
        assert_eq!(tree["workbuy"]["organization"]["prefix"], json!("WB"));
        assert_eq!(tree["taxpayer"]["key"], json!("K"));

        // nested line: owner stays an id, its own references expand
        let line = &tree["work_products"][0];
        assert_eq!(line["work_id"], json!(work));
        assert!(line.get("work").is_none());
        assert_eq!(line["product"]["brand"]["name"], json!("Bosch"));
        assert_eq!(line["price"], json!(10.0));

        for field in ["work_customer_products", "work_unregisteredproducts", "work_employees", "payments"] {
            assert_eq!(tree[field], json!([]), "{}", field);
        }
    }

    #[test]
    fn test_null_reference_expands_to_null() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let product = insert(&conn, EntityKind::Product, json!({"code": "X", "name": "Loose"}));

        let tree = fetch_tree(&conn, EntityKind::Product.schema(), product).unwrap().unwrap();
        assert_eq!(tree["brand"], Value::Null);
        assert_eq!(tree["appliance"], Value::Null);
    }
}
