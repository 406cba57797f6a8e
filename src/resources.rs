// 📚 Resource Registrar - the five operations, once, for every resource
//
// Each resource is a row in `RESOURCES`: a path name, the entity kind it
// serves and how its list endpoint filters. The HTTP layer builds its
// routes from this table; nothing here knows about HTTP.
//
// Mutations follow one path:
//   permission → normalize → write parent → reconcile collections → commit
//   → refetch tree → compute aggregates

use chrono::{Duration, NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::aggregates;
use crate::auth::Principal;
use crate::db::{self, Condition, OrderBy, Record};
use crate::error::{BackofficeError, Result};
use crate::normalizer;
use crate::reconciliation::{split_collections, ReconciliationEngine};
use crate::schema::{EntityKind, EntitySchema};
use crate::tree::TreeBuilder;

// ============================================================================
// RESOURCE TABLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    /// `filters={"column": value, ...}`
    Equality,
    /// `from_date` / `to_date` on `created_at`, newest first
    DateRange,
    /// `workbuy_ids=1,2` / `storagebuy_ids=3`
    BuyIds,
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceDescriptor {
    pub name: &'static str,
    pub kind: EntityKind,
    pub filter: FilterStrategy,
}

const fn resource(name: &'static str, kind: EntityKind, filter: FilterStrategy) -> ResourceDescriptor {
    ResourceDescriptor { name, kind, filter }
}

pub static RESOURCES: &[ResourceDescriptor] = &[
    resource("provider", EntityKind::Provider, FilterStrategy::Equality),
    resource("customer", EntityKind::Customer, FilterStrategy::Equality),
    resource("employee", EntityKind::Employee, FilterStrategy::Equality),
    resource("taxpayer", EntityKind::TaxPayer, FilterStrategy::Equality),
    resource("organization", EntityKind::Organization, FilterStrategy::Equality),
    resource("storagetype", EntityKind::StorageType, FilterStrategy::Equality),
    resource("storage", EntityKind::Storage, FilterStrategy::Equality),
    resource("brand", EntityKind::Brand, FilterStrategy::Equality),
    resource("appliance", EntityKind::Appliance, FilterStrategy::Equality),
    resource("product", EntityKind::Product, FilterStrategy::Equality),
    resource("percentage", EntityKind::Percentage, FilterStrategy::Equality),
    resource("workbuy", EntityKind::WorkBuy, FilterStrategy::DateRange),
    resource("storagebuy", EntityKind::StorageBuy, FilterStrategy::DateRange),
    resource("order", EntityKind::Order, FilterStrategy::BuyIds),
    resource("work", EntityKind::Work, FilterStrategy::BuyIds),
    resource("work_by_date", EntityKind::Work, FilterStrategy::DateRange),
];

pub fn find_resource(name: &str) -> Option<&'static ResourceDescriptor> {
    RESOURCES.iter().find(|r| r.name == name)
}

// ============================================================================
// LIST PARAMETERS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub filters: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub workbuy_ids: Option<String>,
    pub storagebuy_ids: Option<String>,
}

/// Inclusive day range as `created_at` bounds. Defaults to the last seven
/// days through the end of `today`.
pub fn date_range_bounds(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    today: NaiveDate,
) -> (String, String) {
    let from = from.unwrap_or(today - Duration::days(7));
    let until = to.unwrap_or(today) + Duration::days(1);
    (
        format!("{}T00:00:00Z", from.format("%Y-%m-%d")),
        format!("{}T00:00:00Z", until.format("%Y-%m-%d")),
    )
}

fn parse_ids(field: &str, raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                BackofficeError::validation(format!("'{}' is not a valid id in {}", s, field))
            })
        })
        .collect()
}

fn equality_conditions(raw: &str) -> Result<Vec<Condition>> {
    let filters: Record = serde_json::from_str(raw)
        .map_err(|e| BackofficeError::validation(format!("filters must be a JSON object: {}", e)))?;

    filters
        .into_iter()
        .map(|(key, value)| match value {
            Value::Array(_) | Value::Object(_) => Err(BackofficeError::validation(format!(
                "filter '{}' must be a scalar",
                key
            ))),
            value => Ok(Condition::Equals(key, value)),
        })
        .collect()
}

// ============================================================================
// OPERATIONS
// ============================================================================

impl ResourceDescriptor {
    pub fn schema(&self) -> &'static EntitySchema {
        self.kind.schema()
    }

    pub fn list(&self, conn: &Connection, params: &ListParams) -> Result<Vec<Record>> {
        let schema = self.schema();

        let (conditions, order) = match self.filter {
            FilterStrategy::Equality => {
                let conditions = match params.filters.as_deref() {
                    Some(raw) if !raw.trim().is_empty() => equality_conditions(raw)?,
                    _ => Vec::new(),
                };
                (conditions, OrderBy::Natural)
            }
            FilterStrategy::DateRange => {
                let (from, until) =
                    date_range_bounds(params.from_date, params.to_date, Utc::now().date_naive());
                debug!("{}: created_at between {} and {}", self.name, from, until);
                (
                    vec![
                        Condition::AtLeast("created_at", from),
                        Condition::AtMost("created_at", until),
                    ],
                    OrderBy::NewestFirst,
                )
            }
            FilterStrategy::BuyIds => {
                let mut conditions = Vec::new();
                if let Some(raw) = params.workbuy_ids.as_deref().filter(|s| !s.is_empty()) {
                    conditions.push(Condition::OneOf("workbuy_id", parse_ids("workbuy_ids", raw)?));
                }
                if let Some(raw) = params.storagebuy_ids.as_deref().filter(|s| !s.is_empty()) {
                    if schema.column("storagebuy_id").is_some() {
                        conditions.push(Condition::OneOf(
                            "storagebuy_id",
                            parse_ids("storagebuy_ids", raw)?,
                        ));
                    } else {
                        conditions.push(Condition::OneOf("id", Vec::new()));
                    }
                }
                if conditions.is_empty() {
                    return Ok(Vec::new());
                }
                (conditions, OrderBy::Natural)
            }
        };

        let rows = db::fetch_where(conn, schema, &conditions, order)?;
        debug!("{}: {} rows", self.name, rows.len());

        let mut builder = TreeBuilder::new(conn);
        rows.into_iter()
            .map(|row| {
                let mut tree = builder.materialize(schema, row, None)?;
                aggregates::decorate(schema, &mut tree);
                Ok(tree)
            })
            .collect()
    }

    pub fn get(&self, conn: &Connection, id: i64) -> Result<Record> {
        read_tree(conn, self.schema(), id)
    }

    pub fn create(&self, conn: &mut Connection, principal: &Principal, payload: &Record) -> Result<Record> {
        principal.require_elevated(&format!("create {}", self.name))?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = create_in(&tx, self.schema(), payload)?;
        tx.commit()?;

        read_tree(conn, self.schema(), id)
    }

    pub fn update(
        &self,
        conn: &mut Connection,
        principal: &Principal,
        id: i64,
        payload: &Record,
    ) -> Result<Record> {
        principal.require_elevated(&format!("update {}", self.name))?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        update_in(&tx, self.schema(), id, payload)?;
        tx.commit()?;

        read_tree(conn, self.schema(), id)
    }

    /// Deletes the row and, through the storage cascade, everything it owns
    pub fn delete(&self, conn: &mut Connection, principal: &Principal, id: i64) -> Result<String> {
        principal.require_elevated(&format!("delete {}", self.name))?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !db::delete_record(&tx, self.schema(), id)? {
            return Err(BackofficeError::not_found(self.schema().name(), id));
        }
        tx.commit()?;

        info!("deleted {} {}", self.name, id);
        Ok(format!("Deleted {} {}", self.name, id))
    }
}

// ============================================================================
// BUILDING BLOCKS (run inside the caller's transaction)
// ============================================================================

/// Normalize, insert the parent, reconcile every collection present
pub fn create_in(conn: &Connection, schema: &EntitySchema, payload: &Record) -> Result<i64> {
    let normalized = normalizer::normalize(conn, schema, payload)?;
    let (mut scalars, collections) = split_collections(schema, normalized);
    scalars.remove("id");

    let id = db::insert_record(conn, schema, &scalars)?;
    let reports = ReconciliationEngine::new(conn).reconcile_all(schema, id, &collections)?;

    info!("created {} {} ({} collections)", schema.name(), id, reports.len());
    Ok(id)
}

/// Apply the scalars present and reconcile the collections present.
/// Omitted scalars and omitted collections are left alone.
pub fn update_in(conn: &Connection, schema: &EntitySchema, id: i64, payload: &Record) -> Result<()> {
    if !db::exists(conn, schema, id)? {
        return Err(BackofficeError::not_found(schema.name(), id));
    }

    let normalized = normalizer::normalize(conn, schema, payload)?;
    let (mut scalars, collections) = split_collections(schema, normalized);
    scalars.remove("id");

    db::update_record(conn, schema, id, &scalars)?;
    let reports = ReconciliationEngine::new(conn).reconcile_all(schema, id, &collections)?;

    for report in &reports {
        debug!("{} {}: {}", schema.name(), id, report.summary());
    }
    info!("updated {} {}", schema.name(), id);
    Ok(())
}

/// Materialized, decorated tree for one row
pub fn read_tree(conn: &Connection, schema: &EntitySchema, id: i64) -> Result<Record> {
    let mut tree = TreeBuilder::new(conn)
        .fetch(schema, id)?
        .ok_or_else(|| BackofficeError::not_found(schema.name(), id))?;
    aggregates::decorate(schema, &mut tree);
    Ok(tree)
}

// ============================================================================
// TESTS
// ============================================================================
