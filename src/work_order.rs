// 🛒 Work orders - purchase orders generated from a work's lines
//
// The caller maps work lines to providers. Lines are grouped per provider
// into one Order each. A line whose product the provider sells becomes a
// registered order line at the provider's price; anything else becomes a
// free-text line at price 0 for the provider to quote, described as
// "{name} - {description}" (just "{name}" when the product has no
// description).

use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::auth::Principal;
use crate::db::{self, Condition, OrderBy, Record};
use crate::error::{BackofficeError, Result};
use crate::resources::{create_in, read_tree};
use crate::schema::EntityKind;
use crate::tree::TreeBuilder;

/// Work line id → provider id, per kind of line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderRequest {
    #[serde(default)]
    pub work_product_providers: BTreeMap<i64, i64>,
    #[serde(default)]
    pub work_unregisteredproduct_providers: BTreeMap<i64, i64>,
    #[serde(default)]
    pub work_customer_product_providers: BTreeMap<i64, i64>,
}

/// What one provider sells: product id → (provider product id, price)
type Catalog = HashMap<i64, (i64, Value)>;

#[derive(Debug, Default)]
struct OrderDraft {
    registered: Vec<Value>,
    unregistered: Vec<Value>,
}

impl OrderDraft {
    fn is_empty(&self) -> bool {
        self.registered.is_empty() && self.unregistered.is_empty()
    }
}

fn lines_by_id(work: &Record, field: &str) -> HashMap<i64, Record> {
    work.get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .filter_map(|line| Some((line.get("id")?.as_i64()?, line.clone())))
        .collect()
}

fn field(record: &Record, name: &str) -> Value {
    record.get(name).cloned().unwrap_or(Value::Null)
}

fn text<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str)
}

fn product_description(product: &Record) -> String {
    let name = text(product, "name").unwrap_or_default();
    match text(product, "description") {
        Some(description) => format!("{} - {}", name, description),
        None => name.to_string(),
    }
}

/// Registered line if the provider sells `product`, free-text line otherwise
fn order_line(catalog: &Catalog, product: &Record, amount: &Value) -> (bool, Value) {
    let product_id = product.get("id").and_then(Value::as_i64);
    match product_id.and_then(|id| catalog.get(&id)) {
        Some((provider_product_id, price)) => (
            true,
            json!({
                "provider_product_id": provider_product_id,
                "amount": amount,
                "price": price,
            }),
        ),
        None => (
            false,
            json!({
                "code": field(product, "code"),
                "description": product_description(product),
                "amount": amount,
                "price": 0,
            }),
        ),
    }
}

struct Generator<'c> {
    conn: &'c Connection,
    catalogs: HashMap<i64, Option<Catalog>>,
    drafts: BTreeMap<i64, OrderDraft>,
}

impl<'c> Generator<'c> {
    /// `None` when the provider does not exist
    fn catalog(&mut self, provider_id: i64) -> Result<Option<&Catalog>> {
        if !self.catalogs.contains_key(&provider_id) {
            let catalog = if db::exists(self.conn, EntityKind::Provider.schema(), provider_id)? {
                let rows = db::fetch_where(
                    self.conn,
                    EntityKind::ProviderProduct.schema(),
                    &[Condition::Equals("provider_id".to_string(), Value::from(provider_id))],
                    OrderBy::Natural,
                )?;
                let catalog: Catalog = rows
                    .into_iter()
                    .filter_map(|pp| {
                        let product = pp.get("product_id")?.as_i64()?;
                        let id = pp.get("id")?.as_i64()?;
                        Some((product, (id, pp.get("price").cloned().unwrap_or(Value::Null))))
                    })
                    .collect();
                Some(catalog)
            } else {
                None
            };
            self.catalogs.insert(provider_id, catalog);
        }
        Ok(self.catalogs.get(&provider_id).and_then(Option::as_ref))
    }

    fn push(&mut self, provider_id: i64, registered: bool, line: Value) {
        let draft = self.drafts.entry(provider_id).or_default();
        if registered {
            draft.registered.push(line);
        } else {
            draft.unregistered.push(line);
        }
    }

    fn add_product_line(&mut self, provider_id: i64, product: &Record, amount: &Value) -> Result<()> {
        let Some(catalog) = self.catalog(provider_id)? else {
            debug!("provider {} not found, skipping line", provider_id);
            return Ok(());
        };
        let (registered, line) = order_line(catalog, product, amount);
        self.push(provider_id, registered, line);
        Ok(())
    }
}

/// Create one authorized Order per provider from the mapped lines of a work
pub fn generate_orders(
    conn: &mut Connection,
    principal: &Principal,
    work_id: i64,
    request: &WorkOrderRequest,
) -> Result<Vec<Record>> {
    principal.require_elevated("generate work orders")?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let work_schema = EntityKind::Work.schema();
    let work = TreeBuilder::new(&tx)
        .fetch(work_schema, work_id)?
        .ok_or_else(|| BackofficeError::not_found(work_schema.name(), work_id))?;

    let mut generator = Generator {
        conn: &tx,
        catalogs: HashMap::new(),
        drafts: BTreeMap::new(),
    };

    let products = lines_by_id(&work, "work_products");
    for (line_id, provider_id) in &request.work_product_providers {
        let Some(line) = products.get(line_id) else {
            debug!("work product {} not on work {}", line_id, work_id);
            continue;
        };
        if let Some(product) = line.get("product").and_then(Value::as_object) {
            generator.add_product_line(*provider_id, product, &field(line, "amount"))?;
        }
    }

    let unregistered = lines_by_id(&work, "work_unregisteredproducts");
    for (line_id, provider_id) in &request.work_unregisteredproduct_providers {
        let Some(line) = unregistered.get(line_id) else {
            debug!("unregistered product {} not on work {}", line_id, work_id);
            continue;
        };
        if generator.catalog(*provider_id)?.is_none() {
            continue;
        }
        let order_line = json!({
            "code": field(line, "code"),
            "description": field(line, "description"),
            "amount": field(line, "amount"),
            "price": 0,
        });
        generator.push(*provider_id, false, order_line);
    }

    let customer_products = lines_by_id(&work, "work_customer_products");
    for (line_id, provider_id) in &request.work_customer_product_providers {
        let Some(line) = customer_products.get(line_id) else {
            debug!("customer product {} not on work {}", line_id, work_id);
            continue;
        };
        let Some(customer_product) = line.get("customer_product").and_then(Value::as_object) else {
            continue;
        };
        match customer_product.get("product").and_then(Value::as_object) {
            Some(product) => {
                generator.add_product_line(*provider_id, product, &field(line, "amount"))?
            }
            None => {
                if generator.catalog(*provider_id)?.is_none() {
                    continue;
                }
                let code = field(customer_product, "code");
                let order_line = json!({
                    "code": code,
                    "description": code,
                    "amount": field(line, "amount"),
                    "price": 0,
                });
                generator.push(*provider_id, false, order_line);
            }
        }
    }

    let drafts = std::mem::take(&mut generator.drafts);
    let mut order_ids = Vec::new();
    for (provider_id, draft) in drafts {
        if draft.is_empty() {
            debug!("no lines for provider {}, no order", provider_id);
            continue;
        }
        let mut payload = Record::new();
        payload.insert("provider_id".to_string(), Value::from(provider_id));
        payload.insert("taxpayer_id".to_string(), field(&work, "taxpayer_id"));
        payload.insert("workbuy_id".to_string(), field(&work, "workbuy_id"));
        payload.insert("authorized".to_string(), Value::Bool(true));
        payload.insert("order_provider_products".to_string(), Value::Array(draft.registered));
        payload.insert("order_unregisteredproducts".to_string(), Value::Array(draft.unregistered));
        order_ids.push(create_in(&tx, EntityKind::Order.schema(), &payload)?);
    }

    tx.commit()?;
    info!("work {}: generated {} orders", work_id, order_ids.len());

    order_ids
        .into_iter()
        .map(|id| read_tree(conn, EntityKind::Order.schema(), id))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
