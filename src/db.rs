// 🗄️ Storage - SQLite tables generated from the entity registry
//
// Rows travel as JSON maps (`Record`). Column types decide how a JSON value
// is bound and how a stored value is read back.

use chrono::{SecondsFormat, Utc};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::entities::{self, ALL};
use crate::error::{BackofficeError, Result};
use crate::money;
use crate::schema::{AutoValue, Column, ColumnType, EntityKind, EntitySchema, Ordering};

/// One row, or one payload for a row, keyed by column/field name
pub type Record = serde_json::Map<String, Value>;

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident)
}

// ============================================================================
// SCHEMA SETUP
// ============================================================================

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    for schema in ALL {
        conn.execute(&create_table_sql(schema), [])?;

        for col in schema.columns {
            if col.reference_target().is_some() || col.auto == Some(AutoValue::CreatedAt) {
                conn.execute(
                    &format!(
                        "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                        quote(&format!("idx_{}_{}", schema.table, col.name)),
                        quote(schema.table),
                        quote(col.name)
                    ),
                    [],
                )?;
            }
        }
    }

    debug!("schema ready: {} tables", ALL.len());
    Ok(())
}

fn create_table_sql(schema: &EntitySchema) -> String {
    let mut parts = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote("id"))];
    parts.extend(schema.columns.iter().map(|col| column_ddl(schema.kind, col)));

    for group in schema.unique_together {
        let cols: Vec<String> = group.iter().map(|c| quote(c)).collect();
        parts.push(format!("UNIQUE ({})", cols.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote(schema.table),
        parts.join(",\n    ")
    )
}

fn column_ddl(owner: EntityKind, col: &Column) -> String {
    let sql_type = match col.ty {
        ColumnType::Integer | ColumnType::Bool | ColumnType::Reference(_) => "INTEGER",
        ColumnType::Float => "REAL",
        // Decimal included: currency is kept as exact text, two places
        _ => "TEXT",
    };

    let mut ddl = format!("{} {}", quote(col.name), sql_type);
    if !col.nullable {
        ddl.push_str(" NOT NULL");
    }
    if col.unique {
        ddl.push_str(" UNIQUE");
    }
    if let Some(default) = col.default_sql {
        ddl.push_str(&format!(" DEFAULT {}", default));
    }

    match col.ty {
        ColumnType::Integer if col.non_negative => {
            ddl.push_str(&format!(" CHECK ({} >= 0)", quote(col.name)));
        }
        ColumnType::Choice(choices) => {
            let allowed: Vec<String> = choices.iter().map(|c| format!("'{}'", c)).collect();
            ddl.push_str(&format!(
                " CHECK ({} IN ({}))",
                quote(col.name),
                allowed.join(", ")
            ));
        }
        ColumnType::Reference(target) => {
            let on_delete = if entities::owning_collection(owner, col.name).is_some() {
                "CASCADE"
            } else if col.nullable {
                "SET NULL"
            } else {
                "RESTRICT"
            };
            ddl.push_str(&format!(
                " REFERENCES {}({}) ON DELETE {}",
                quote(target.schema().table),
                quote("id"),
                on_delete
            ));
        }
        _ => {}
    }

    ddl
}

// ============================================================================
// VALUE CONVERSION
// ============================================================================

fn type_error(col: &Column, value: &Value) -> BackofficeError {
    BackofficeError::validation(format!(
        "invalid value for '{}': {}",
        col.name, value
    ))
}

/// Bind a JSON value into the SQLite representation of `col`
pub fn to_sql(col: &Column, value: &Value) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let bound = match col.ty {
        ColumnType::Integer | ColumnType::Reference(_) => value.as_i64().map(SqlValue::Integer),
        ColumnType::Float => value.as_f64().map(SqlValue::Real),
        ColumnType::Decimal => money::parse_money(value).map(|d| SqlValue::Text(money::to_storage(d))),
        ColumnType::Bool => value.as_bool().map(|b| SqlValue::Integer(b as i64)),
        ColumnType::Text
        | ColumnType::Date
        | ColumnType::Timestamp
        | ColumnType::Uuid
        | ColumnType::Choice(_) => value.as_str().map(|s| SqlValue::Text(s.to_string())),
    };

    bound.ok_or_else(|| type_error(col, value))
}

fn from_sql(col: &Column, raw: ValueRef<'_>) -> Value {
    match (col.ty, raw) {
        (_, ValueRef::Null) => Value::Null,
        (ColumnType::Bool, ValueRef::Integer(i)) => Value::Bool(i != 0),
        (ColumnType::Decimal, ValueRef::Text(bytes)) => {
            let text = String::from_utf8_lossy(bytes);
            money::parse_money(&Value::String(text.to_string()))
                .map(money::money_json)
                .unwrap_or(Value::Null)
        }
        (_, ValueRef::Integer(i)) => Value::from(i),
        (_, ValueRef::Real(f)) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        (_, ValueRef::Text(bytes)) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        (_, ValueRef::Blob(_)) => Value::Null,
    }
}

// ============================================================================
// ROW OPERATIONS
// ============================================================================

/// Insert a normalized record, filling automatic columns. Missing required
/// columns surface as `Integrity` from the NOT NULL constraint.
pub fn insert_record(conn: &Connection, schema: &EntitySchema, record: &Record) -> Result<i64> {
    let mut names = Vec::new();
    let mut values = Vec::new();

    for col in schema.columns {
        let value = match (record.get(col.name), col.auto) {
            (_, Some(AutoValue::CreatedAt)) | (_, Some(AutoValue::ModifiedAt)) => {
                SqlValue::Text(now_timestamp())
            }
            (None, Some(AutoValue::Today)) | (Some(Value::Null), Some(AutoValue::Today)) => {
                SqlValue::Text(today())
            }
            (Some(v), _) => to_sql(col, v)?,
            (None, None) => continue,
        };
        names.push(quote(col.name));
        values.push(value);
    }

    let sql = if names.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", quote(schema.table))
    } else {
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(schema.table),
            names.join(", "),
            placeholders.join(", ")
        )
    };

    conn.execute(&sql, params_from_iter(values))?;
    Ok(conn.last_insert_rowid())
}

/// Apply the columns present in `record` to row `id`. `NotFound` if the row
/// does not exist.
pub fn update_record(
    conn: &Connection,
    schema: &EntitySchema,
    id: i64,
    record: &Record,
) -> Result<()> {
    let mut sets = Vec::new();
    let mut values = Vec::new();

    for col in schema.columns {
        match col.auto {
            Some(AutoValue::CreatedAt) => continue,
            Some(AutoValue::ModifiedAt) => {
                sets.push(format!("{} = ?{}", quote(col.name), values.len() + 1));
                values.push(SqlValue::Text(now_timestamp()));
            }
            _ => {
                if let Some(v) = record.get(col.name) {
                    sets.push(format!("{} = ?{}", quote(col.name), values.len() + 1));
                    values.push(to_sql(col, v)?);
                }
            }
        }
    }

    if sets.is_empty() {
        return if exists(conn, schema, id)? {
            Ok(())
        } else {
            Err(BackofficeError::not_found(schema.name(), id))
        };
    }

    values.push(SqlValue::Integer(id));
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        quote(schema.table),
        sets.join(", "),
        quote("id"),
        values.len()
    );

    let changed = conn.execute(&sql, params_from_iter(values))?;
    if changed == 0 {
        return Err(BackofficeError::not_found(schema.name(), id));
    }
    Ok(())
}

pub fn delete_record(conn: &Connection, schema: &EntitySchema, id: i64) -> Result<bool> {
    let changed = conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?1", quote(schema.table), quote("id")),
        [id],
    )?;
    Ok(changed > 0)
}

pub fn exists(conn: &Connection, schema: &EntitySchema, id: i64) -> Result<bool> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE {} = ?1", quote(schema.table), quote("id")),
            [id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Id of the row whose `column` equals `value` exactly
pub fn find_id_by(
    conn: &Connection,
    schema: &EntitySchema,
    column: &str,
    value: &str,
) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            &format!(
                "SELECT {} FROM {} WHERE {} = ?1",
                quote("id"),
                quote(schema.table),
                quote(column)
            ),
            [value],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

// ============================================================================
// QUERIES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(String, Value),
    AtLeast(&'static str, String),
    AtMost(&'static str, String),
    OneOf(&'static str, Vec<i64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    Natural,
    NewestFirst,
}

fn column_for(schema: &EntitySchema, name: &str) -> Result<Option<&'static Column>> {
    if name == "id" {
        return Ok(None);
    }
    schema
        .column(name)
        .map(Some)
        .ok_or_else(|| BackofficeError::validation(format!("unknown field '{}'", name)))
}

pub fn fetch_record(conn: &Connection, schema: &EntitySchema, id: i64) -> Result<Option<Record>> {
    let mut rows = fetch_where(
        conn,
        schema,
        &[Condition::Equals("id".to_string(), Value::from(id))],
        OrderBy::Natural,
    )?;
    Ok(rows.pop())
}

pub fn fetch_where(
    conn: &Connection,
    schema: &EntitySchema,
    conditions: &[Condition],
    order: OrderBy,
) -> Result<Vec<Record>> {
    let mut clauses = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    for condition in conditions {
        match condition {
            Condition::Equals(name, value) => {
                let bound = match column_for(schema, name)? {
                    Some(col) => to_sql(col, value)?,
                    None => value
                        .as_i64()
                        .map(SqlValue::Integer)
                        .ok_or_else(|| BackofficeError::validation("id must be an integer"))?,
                };
                if bound == SqlValue::Null {
                    clauses.push(format!("{} IS NULL", quote(name)));
                } else {
                    values.push(bound);
                    clauses.push(format!("{} = ?{}", quote(name), values.len()));
                }
            }
            Condition::AtLeast(name, bound) => {
                values.push(SqlValue::Text(bound.clone()));
                clauses.push(format!("{} >= ?{}", quote(name), values.len()));
            }
            Condition::AtMost(name, bound) => {
                values.push(SqlValue::Text(bound.clone()));
                clauses.push(format!("{} <= ?{}", quote(name), values.len()));
            }
            Condition::OneOf(name, ids) => {
                if ids.is_empty() {
                    clauses.push("0".to_string());
                    continue;
                }
                let mut slots = Vec::new();
                for id in ids {
                    values.push(SqlValue::Integer(*id));
                    slots.push(format!("?{}", values.len()));
                }
                clauses.push(format!("{} IN ({})", quote(name), slots.join(", ")));
            }
        }
    }

    let names: Vec<String> = std::iter::once(quote("id"))
        .chain(schema.columns.iter().map(|c| quote(c.name)))
        .collect();

    let mut sql = format!("SELECT {} FROM {}", names.join(", "), quote(schema.table));
    if !clauses.is_empty() {
        sql.push_str(&format!(" WHERE {}", clauses.join(" AND ")));
    }
    sql.push_str(match (order, schema.ordering) {
        (OrderBy::NewestFirst, _) => " ORDER BY \"id\" DESC",
        (OrderBy::Natural, Ordering::ByName) => " ORDER BY \"name\", \"id\"",
        (OrderBy::Natural, Ordering::ById) => " ORDER BY \"id\"",
    });

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            let mut record = Record::new();
            record.insert("id".to_string(), Value::from(row.get::<_, i64>(0)?));
            for (i, col) in schema.columns.iter().enumerate() {
                record.insert(col.name.to_string(), from_sql(col, row.get_ref(i + 1)?));
            }
            Ok(record)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Ids of the rows of `child` owned by `parent_id` through `foreign_key`
pub fn child_ids(
    conn: &Connection,
    child: &EntitySchema,
    foreign_key: &str,
    parent_id: i64,
) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {}",
        quote("id"),
        quote(child.table),
        quote(foreign_key),
        quote("id")
    ))?;
    let ids = stmt
        .query_map([parent_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

pub fn count_rows(conn: &Connection, schema: &EntitySchema) -> Result<i64> {
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote(schema.table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_setup_is_repeatable() {
        let conn = setup();
        setup_database(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables as usize, ALL.len());
        println!("✅ {} tables created", tables);
    }

    #[test]
    fn test_insert_fills_auto_columns() {
        let conn = setup();
        let customer = insert_record(&conn, EntityKind::Customer.schema(), &record(json!({"name": "ACME"}))).unwrap();
        let org = insert_record(&conn, EntityKind::Organization.schema(), &record(json!({"name": "Main", "prefix": "WB"}))).unwrap();

        let id = insert_record(
            &conn,
            EntityKind::WorkBuy.schema(),
            &record(json!({"customer_id": customer, "organization_id": org})),
        )
        .unwrap();

        let row = fetch_record(&conn, EntityKind::WorkBuy.schema(), id).unwrap().unwrap();
        let created = row["created_at"].as_str().unwrap();
        assert!(created.ends_with('Z'));
        assert_eq!(row["customer_id"], json!(customer));
    }

    #[test]
    fn test_decimal_and_bool_round_trip() {
        let conn = setup();
        let provider = insert_record(&conn, EntityKind::Provider.schema(), &record(json!({"name": "P"}))).unwrap();
        let taxpayer = insert_record(&conn, EntityKind::TaxPayer.schema(), &record(json!({"name": "T", "key": "K"}))).unwrap();

        let id = insert_record(
            &conn,
            EntityKind::Order.schema(),
            &record(json!({
                "provider_id": provider,
                "taxpayer_id": taxpayer,
                "discount": "5.5",
                "include_iva": true,
            })),
        )
        .unwrap();

        let row = fetch_record(&conn, EntityKind::Order.schema(), id).unwrap().unwrap();
        assert_eq!(row["discount"], json!(5.5));
        assert_eq!(row["include_iva"], json!(true));
        assert_eq!(row["authorized"], json!(false));
        assert_eq!(row["state"], json!("A"));

        let stored: String = conn
            .query_row("SELECT discount FROM orders WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, "5.50");
    }

    #[test]
    fn test_missing_required_column_is_integrity() {
        let conn = setup();
        let err = insert_record(&conn, EntityKind::Order.schema(), &Record::new()).unwrap_err();
        assert!(err.is_integrity(), "got {:?}", err);
    }

    #[test]
    fn test_unique_together() {
        let conn = setup();
        let org = insert_record(&conn, EntityKind::Organization.schema(), &record(json!({"name": "O"}))).unwrap();
        let st = insert_record(&conn, EntityKind::StorageType.schema(), &record(json!({"name": "S"}))).unwrap();
        let row = record(json!({"organization_id": org, "storagetype_id": st}));

        insert_record(&conn, EntityKind::Storage.schema(), &row).unwrap();
        let err = insert_record(&conn, EntityKind::Storage.schema(), &row).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let conn = setup();
        let err = update_record(&conn, EntityKind::Brand.schema(), 99, &record(json!({"name": "X"})))
            .unwrap_err();
        assert!(matches!(err, BackofficeError::NotFound(_)));
    }

    #[test]
    fn test_cascade_and_restrict() {
        let conn = setup();
        let provider = insert_record(&conn, EntityKind::Provider.schema(), &record(json!({"name": "P"}))).unwrap();
        let taxpayer = insert_record(&conn, EntityKind::TaxPayer.schema(), &record(json!({"name": "T", "key": "K"}))).unwrap();
        let order = insert_record(
            &conn,
            EntityKind::Order.schema(),
            &record(json!({"provider_id": provider, "taxpayer_id": taxpayer})),
        )
        .unwrap();
        insert_record(
            &conn,
            EntityKind::OrderUnregisteredProduct.schema(),
            &record(json!({"order_id": order, "description": "bolt", "amount": 3})),
        )
        .unwrap();

        // Provider is a required reference of Order
        let err = delete_record(&conn, EntityKind::Provider.schema(), provider).unwrap_err();
        assert!(err.is_integrity());

        // Lines are owned by the order
        assert!(delete_record(&conn, EntityKind::Order.schema(), order).unwrap());
        assert_eq!(count_rows(&conn, EntityKind::OrderUnregisteredProduct.schema()).unwrap(), 0);
    }

    #[test]
    fn test_fetch_where_filters_and_orders() {
        let conn = setup();
        for name in ["Zeta", "Alpha", "Mid"] {
            insert_record(&conn, EntityKind::Brand.schema(), &record(json!({"name": name}))).unwrap();
        }

        let all = fetch_where(&conn, EntityKind::Brand.schema(), &[], OrderBy::Natural).unwrap();
        let names: Vec<_> = all.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Alpha", "Mid", "Zeta"]);

        let newest = fetch_where(&conn, EntityKind::Brand.schema(), &[], OrderBy::NewestFirst).unwrap();
        assert_eq!(newest[0]["name"], json!("Mid"));

        let one = fetch_where(
            &conn,
            EntityKind::Brand.schema(),
            &[Condition::Equals("name".into(), json!("Zeta"))],
            OrderBy::Natural,
        )
        .unwrap();
        assert_eq!(one.len(), 1);

        let none = fetch_where(&conn, EntityKind::Brand.schema(), &[Condition::OneOf("id", vec![])], OrderBy::Natural).unwrap();
        assert!(none.is_empty());

        let err = fetch_where(
            &conn,
            EntityKind::Brand.schema(),
            &[Condition::Equals("name; DROP TABLE brand".into(), json!("x"))],
            OrderBy::Natural,
        )
        .unwrap_err();
        assert!(matches!(err, BackofficeError::Validation(_)));
    }

    #[test]
    fn test_find_id_by_is_exact() {
        let conn = setup();
        let id = insert_record(&conn, EntityKind::Brand.schema(), &record(json!({"name": "Bosch"}))).unwrap();
        assert_eq!(find_id_by(&conn, EntityKind::Brand.schema(), "name", "Bosch").unwrap(), Some(id));
        assert_eq!(find_id_by(&conn, EntityKind::Brand.schema(), "name", "bosch").unwrap(), None);
    }
}
