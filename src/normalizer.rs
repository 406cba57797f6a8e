// 🧹 Field Normalizer - clean a payload before it touches storage
//
// - `"provider": 3` / `"provider": {"id": 3, ...}` → `provider_id: 3`
// - `brand_name: "Bosch"` (or `brand: "Bosch"`) → get-or-create → `brand_id`
// - `*_id: 0` is a "not set" sentinel and is stripped
// - every value is checked against its column type
// - nested collections are normalized with the child kind's rules
// - anything else (computed fields, expanded echoes, typos) is dropped

use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::db::{self, Record};
use crate::error::{BackofficeError, Result};
use crate::money;
use crate::schema::{AutoValue, Column, ColumnType, EntitySchema, NamedReference};

/// Upper bound for integer columns such as line `amount`
pub const MAX_INTEGER: i64 = i32::MAX as i64;

/// Normalize a top-level payload for `schema`
pub fn normalize(conn: &Connection, schema: &EntitySchema, payload: &Record) -> Result<Record> {
    normalize_with_owner(conn, schema, payload, None)
}

/// Normalize a payload nested under a parent. The owning foreign key is
/// dropped: the reconciler sets it.
pub fn normalize_with_owner(
    conn: &Connection,
    schema: &EntitySchema,
    payload: &Record,
    owner_fk: Option<&str>,
) -> Result<Record> {
    let mut out = Record::new();

    for (key, value) in payload {
        if key == "id" {
            match value {
                Value::Null => {}
                Value::Number(n) if n.as_i64().is_some() => {
                    out.insert(key.clone(), value.clone());
                }
                _ => {
                    return Err(BackofficeError::validation(format!(
                        "{}: id must be an integer",
                        schema.name()
                    )))
                }
            }
            continue;
        }

        if let Some(collection) = schema.child(key) {
            let items = value.as_array().ok_or_else(|| {
                BackofficeError::validation(format!("'{}' must be a list", key))
            })?;
            let child_schema = collection.child.schema();
            let mut normalized = Vec::with_capacity(items.len());
            for item in items {
                let item = item.as_object().ok_or_else(|| {
                    BackofficeError::validation(format!("'{}' entries must be objects", key))
                })?;
                let child =
                    normalize_with_owner(conn, child_schema, item, Some(collection.foreign_key))?;
                normalized.push(Value::Object(child));
            }
            out.insert(key.clone(), Value::Array(normalized));
            continue;
        }

        if let Some(named) = schema.named_reference(key) {
            resolve_named_field(conn, named, key, value, &mut out)?;
            continue;
        }

        if let Some(col) = schema.reference(key) {
            match value {
                Value::Number(_) | Value::Object(_) => {
                    let id = match value {
                        Value::Object(obj) => obj.get("id").cloned().unwrap_or(Value::Null),
                        other => other.clone(),
                    };
                    if id.as_i64() == Some(0) || id.is_null() {
                        debug!("{}: dropping unset reference '{}'", schema.name(), key);
                        continue;
                    }
                    if owner_fk == Some(col.name) {
                        continue;
                    }
                    let checked = check_value(conn, col, &id)?;
                    out.insert(col.name.to_string(), checked);
                }
                Value::String(_) => {
                    // `brand: "Bosch"` resolves like `brand_name`
                    match schema.named_references.iter().find(|r| r.column == col.name) {
                        Some(named) => resolve_named_field(conn, named, key, value, &mut out)?,
                        None => debug!("{}: dropping non-id reference '{}'", schema.name(), key),
                    }
                }
                _ => debug!("{}: dropping reference '{}'", schema.name(), key),
            }
            continue;
        }

        if let Some(col) = schema.column(key) {
            if matches!(col.auto, Some(AutoValue::CreatedAt) | Some(AutoValue::ModifiedAt)) {
                debug!("{}: dropping read-only '{}'", schema.name(), key);
                continue;
            }
            if owner_fk == Some(col.name) {
                continue;
            }
            if key.ends_with("_id") && value.as_i64() == Some(0) {
                debug!("{}: stripping sentinel {} = 0", schema.name(), key);
                continue;
            }
            let checked = check_value(conn, col, value)?;
            out.insert(key.clone(), checked);
            continue;
        }

        debug!("{}: dropping unknown field '{}'", schema.name(), key);
    }

    Ok(out)
}

fn resolve_named_field(
    conn: &Connection,
    named: &NamedReference,
    key: &str,
    value: &Value,
    out: &mut Record,
) -> Result<()> {
    match value {
        Value::Null => {
            out.insert(named.column.to_string(), Value::Null);
        }
        Value::String(name) if name.trim().is_empty() => {
            out.insert(named.column.to_string(), Value::Null);
        }
        Value::String(name) => {
            let id = get_or_create(conn, named, name)?;
            out.insert(named.column.to_string(), Value::from(id));
        }
        _ => {
            return Err(BackofficeError::validation(format!(
                "'{}' must be a name",
                key
            )))
        }
    }
    Ok(())
}

/// Exact, case-sensitive lookup by name; creates the row when absent.
/// A concurrent insert of the same name is retried once as a lookup.
pub fn get_or_create(conn: &Connection, named: &NamedReference, name: &str) -> Result<i64> {
    let schema = named.target.schema();
    if let Some(id) = db::find_id_by(conn, schema, "name", name)? {
        return Ok(id);
    }

    let mut row = Record::new();
    row.insert("name".to_string(), Value::String(name.to_string()));

    match db::insert_record(conn, schema, &row) {
        Ok(id) => {
            info!("created {} '{}' (id {})", schema.name(), name, id);
            Ok(id)
        }
        Err(err) if err.is_integrity() => {
            warn!("{} '{}' appeared concurrently, retrying lookup", schema.name(), name);
            db::find_id_by(conn, schema, "name", name)?.ok_or(err)
        }
        Err(err) => Err(err),
    }
}

fn invalid(col: &Column, value: &Value) -> BackofficeError {
    BackofficeError::validation(format!("invalid value for '{}': {}", col.name, value))
}

fn negative(col: &Column) -> BackofficeError {
    BackofficeError::validation(format!("'{}' must not be negative", col.name))
}

/// Type-check `value` for `col`, returning its canonical form
fn check_value(conn: &Connection, col: &Column, value: &Value) -> Result<Value> {
    if value.is_null() {
        // NOT NULL columns reject this at the storage layer
        return Ok(Value::Null);
    }

    match col.ty {
        ColumnType::Integer => {
            let n = value.as_i64().ok_or_else(|| invalid(col, value))?;
            if col.non_negative && n < 0 {
                return Err(negative(col));
            }
            if n > MAX_INTEGER {
                return Err(BackofficeError::validation(format!(
                    "'{}' must be at most {}",
                    col.name, MAX_INTEGER
                )));
            }
            Ok(Value::from(n))
        }
        ColumnType::Reference(target) => {
            let id = value.as_i64().ok_or_else(|| invalid(col, value))?;
            if !db::exists(conn, target.schema(), id)? {
                return Err(BackofficeError::validation(format!(
                    "{} with id {} does not exist",
                    target.name(),
                    id
                )));
            }
            Ok(Value::from(id))
        }
        ColumnType::Decimal => {
            let amount = money::parse_money(value).ok_or_else(|| invalid(col, value))?;
            if col.non_negative && amount.is_sign_negative() && !amount.is_zero() {
                return Err(negative(col));
            }
            if !money::fits_precision(amount) {
                return Err(BackofficeError::validation(format!(
                    "'{}' must have at most 7 integer digits and 2 decimal places",
                    col.name
                )));
            }
            Ok(Value::String(money::to_storage(amount)))
        }
        ColumnType::Float => value
            .as_f64()
            .map(Value::from)
            .ok_or_else(|| invalid(col, value)),
        ColumnType::Bool => value
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| invalid(col, value)),
        ColumnType::Text | ColumnType::Timestamp => value
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| invalid(col, value)),
        ColumnType::Date => {
            let raw = value.as_str().ok_or_else(|| invalid(col, value))?;
            let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid(col, value))?;
            Ok(Value::String(date.format("%Y-%m-%d").to_string()))
        }
        ColumnType::Uuid => {
            let raw = value.as_str().ok_or_else(|| invalid(col, value))?;
            let parsed = uuid::Uuid::parse_str(raw).map_err(|_| invalid(col, value))?;
            Ok(Value::String(parsed.hyphenated().to_string()))
        }
        ColumnType::Choice(choices) => {
            let raw = value.as_str().ok_or_else(|| invalid(col, value))?;
            if choices.contains(&raw) {
                Ok(Value::String(raw.to_string()))
            } else {
                Err(BackofficeError::validation(format!(
                    "'{}' must be one of {}",
                    col.name,
                    choices.join(", ")
                )))
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, insert_record, setup_database};
    use crate::schema::EntityKind;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn seed_provider(conn: &Connection) -> i64 {
        insert_record(conn, EntityKind::Provider.schema(), &record(json!({"name": "Refacciones"})))
            .unwrap()
    }

    #[test]
    fn test_integer_reference_becomes_fk_column() {
        let conn = setup();
        let provider = seed_provider(&conn);

        let out = normalize(
            &conn,
            EntityKind::Order.schema(),
            &record(json!({"provider": provider, "comment": "rush"})),
        )
        .unwrap();

        assert_eq!(out["provider_id"], json!(provider));
        assert!(!out.contains_key("provider"));
        assert_eq!(out["comment"], json!("rush"));
    }

    #[test]
    fn test_expanded_reference_object_is_accepted() {
        let conn = setup();
        let provider = seed_provider(&conn);

        let out = normalize(
            &conn,
            EntityKind::Order.schema(),
            &record(json!({"provider": {"id": provider, "name": "Refacciones"}})),
        )
        .unwrap();
        assert_eq!(out["provider_id"], json!(provider));
    }

    #[test]
    fn test_zero_ids_are_stripped() {
        let conn = setup();
        let out = normalize(
            &conn,
            EntityKind::Order.schema(),
            &record(json!({"claimant_id": 0, "workbuy_id": 0, "provider": 0})),
        )
        .unwrap();
        assert!(out.is_empty(), "got {:?}", out);
    }

    #[test]
    fn test_named_reference_get_or_create_is_idempotent() {
        let conn = setup();
        let schema = EntityKind::Product.schema();

        let first = normalize(&conn, schema, &record(json!({"brand_name": "Bosch"}))).unwrap();
        let second = normalize(&conn, schema, &record(json!({"brand": "Bosch"}))).unwrap();

        assert_eq!(first["brand_id"], second["brand_id"]);
        assert_eq!(count_rows(&conn, EntityKind::Brand.schema()).unwrap(), 1);

        // Case-sensitive natural key
        normalize(&conn, schema, &record(json!({"brand_name": "BOSCH"}))).unwrap();
        assert_eq!(count_rows(&conn, EntityKind::Brand.schema()).unwrap(), 2);
        println!("✅ natural-key resolution never duplicates");
    }

    fn brand_by_name() -> &'static NamedReference {
        EntityKind::Product.schema().named_reference("brand_name").unwrap()
    }

    /// Another writer inserts the same name between our lookup and our insert
    const CONCURRENT_INSERT: &str = "
        CREATE TRIGGER brand_race BEFORE INSERT ON brand
        BEGIN
            INSERT OR IGNORE INTO brand (name) VALUES (NEW.name);
        END;";

    #[test]
    fn test_get_or_create_retries_lookup_after_race() {
        let conn = Connection::open_in_memory().unwrap();
        // FAIL keeps the trigger's row when the outer insert conflicts
        conn.execute_batch(
            "CREATE TABLE brand (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE ON CONFLICT FAIL
            );",
        )
        .unwrap();
        conn.execute_batch(CONCURRENT_INSERT).unwrap();

        let id = get_or_create(&conn, brand_by_name(), "Bosch").unwrap();

        let stored: i64 = conn
            .query_row("SELECT id FROM brand WHERE name = 'Bosch'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(id, stored);
        assert_eq!(count_rows(&conn, EntityKind::Brand.schema()).unwrap(), 1);
        println!("✅ concurrent insert resolved by the retried lookup");
    }

    #[test]
    fn test_get_or_create_surfaces_integrity_when_retry_misses() {
        let conn = setup();
        // ABORT rolls the trigger's row back with the failed insert
        conn.execute_batch(CONCURRENT_INSERT).unwrap();

        let err = get_or_create(&conn, brand_by_name(), "Bosch").unwrap_err();
        assert!(err.is_integrity(), "{}", err);
        assert_eq!(count_rows(&conn, EntityKind::Brand.schema()).unwrap(), 0);
    }

    #[test]
    fn test_missing_reference_is_validation_error() {
        let conn = setup();
        let err = normalize(&conn, EntityKind::Order.schema(), &record(json!({"provider_id": 77})))
            .unwrap_err();
        assert!(matches!(err, BackofficeError::Validation(_)));
    }

    #[test]
    fn test_type_checks() {
        let conn = setup();
        let schema = EntityKind::Order.schema();

        for bad in [
            json!({"state": "Z"}),
            json!({"invoice_date": "31/12/2024"}),
            json!({"invoice_uuid": "not-a-uuid"}),
            json!({"discount": "ten"}),
            json!({"authorized": "yes"}),
        ] {
            let err = normalize(&conn, schema, &record(bad.clone())).unwrap_err();
            assert!(matches!(err, BackofficeError::Validation(_)), "{}", bad);
        }

        let ok = normalize(
            &conn,
            schema,
            &record(json!({
                "state": "B",
                "invoice_date": "2024-12-31",
                "invoice_uuid": "67E55044-10B1-426F-9247-BB680E5FE0C8",
                "discount": 5,
            })),
        )
        .unwrap();
        assert_eq!(ok["invoice_uuid"], json!("67e55044-10b1-426f-9247-bb680e5fe0c8"));
        assert_eq!(ok["discount"], json!("5.00"));
    }

    #[test]
    fn test_negative_amounts_rejected_in_nested_lines() {
        let conn = setup();
        let err = normalize(
            &conn,
            EntityKind::Work.schema(),
            &record(json!({
                "work_unregisteredproducts": [{"description": "x", "amount": -1, "price": 1}]
            })),
        )
        .unwrap_err();
        assert!(matches!(err, BackofficeError::Validation(_)));

        let err = normalize(
            &conn,
            EntityKind::Work.schema(),
            &record(json!({
                "work_unregisteredproducts": [{"description": "x", "amount": 1, "price": "-0.01"}]
            })),
        )
        .unwrap_err();
        assert!(matches!(err, BackofficeError::Validation(_)));
    }

    #[test]
    fn test_unknown_readonly_and_owner_fields_dropped() {
        let conn = setup();
        let out = normalize(
            &conn,
            EntityKind::Work.schema(),
            &record(json!({
                "subtotal": 40,
                "created_at": "2024-01-01T00:00:00Z",
                "payments": [{"id": null, "work_id": 5, "amount": 10, "total": 1}],
            })),
        )
        .unwrap();

        assert_eq!(out.len(), 1);
        let payment = out["payments"][0].as_object().unwrap();
        assert!(!payment.contains_key("id"));
        assert!(!payment.contains_key("work_id"));
        assert!(!payment.contains_key("total"));
        assert_eq!(payment["amount"], json!("10.00"));
    }

    #[test]
    fn test_collection_must_be_list() {
        let conn = setup();
        let err = normalize(&conn, EntityKind::Work.schema(), &record(json!({"payments": {}})))
            .unwrap_err();
        assert!(matches!(err, BackofficeError::Validation(_)));
    }
}
