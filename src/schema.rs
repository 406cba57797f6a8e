// 📐 Shape Layer - Entity descriptors
// Every entity kind declares, statically, its columns, the child collections
// it owns and the references it holds. Nothing is discovered at runtime.
//
// The normalizer, the reconciler, the tree materializer and the storage
// layer are all driven by these tables.

use serde::Serialize;

// ============================================================================
// ENTITY KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityKind {
    Appliance,
    Brand,
    TaxPayer,
    Organization,
    StorageType,
    Storage,
    Employee,
    Provider,
    ProviderContact,
    Customer,
    CustomerContact,
    Product,
    ProviderProduct,
    CustomerProduct,
    Percentage,
    WorkBuy,
    StorageBuy,
    Order,
    OrderProviderProduct,
    OrderUnregisteredProduct,
    OrderPayment,
    Work,
    WorkProduct,
    WorkCustomerProduct,
    WorkUnregisteredProduct,
    WorkEmployee,
    WorkPayment,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Appliance => "Appliance",
            EntityKind::Brand => "Brand",
            EntityKind::TaxPayer => "TaxPayer",
            EntityKind::Organization => "Organization",
            EntityKind::StorageType => "StorageType",
            EntityKind::Storage => "Storage",
            EntityKind::Employee => "Employee",
            EntityKind::Provider => "Provider",
            EntityKind::ProviderContact => "ProviderContact",
            EntityKind::Customer => "Customer",
            EntityKind::CustomerContact => "CustomerContact",
            EntityKind::Product => "Product",
            EntityKind::ProviderProduct => "ProviderProduct",
            EntityKind::CustomerProduct => "CustomerProduct",
            EntityKind::Percentage => "Percentage",
            EntityKind::WorkBuy => "WorkBuy",
            EntityKind::StorageBuy => "StorageBuy",
            EntityKind::Order => "Order",
            EntityKind::OrderProviderProduct => "OrderProviderProduct",
            EntityKind::OrderUnregisteredProduct => "OrderUnregisteredProduct",
            EntityKind::OrderPayment => "OrderPayment",
            EntityKind::Work => "Work",
            EntityKind::WorkProduct => "WorkProduct",
            EntityKind::WorkCustomerProduct => "WorkCustomerProduct",
            EntityKind::WorkUnregisteredProduct => "WorkUnregisteredProduct",
            EntityKind::WorkEmployee => "WorkEmployee",
            EntityKind::WorkPayment => "WorkPayment",
        }
    }

    /// Static descriptor for this kind
    pub fn schema(&self) -> &'static EntitySchema {
        crate::entities::schema_of(*self)
    }
}

// ============================================================================
// COLUMNS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    /// Currency, stored exactly with two decimal places
    Decimal,
    Float,
    Text,
    Bool,
    /// `YYYY-MM-DD`
    Date,
    /// RFC 3339, UTC
    Timestamp,
    Uuid,
    /// One of a fixed set of single-letter codes
    Choice(&'static [&'static str]),
    /// Foreign key to another entity's `id`
    Reference(EntityKind),
}

/// Value filled in by the storage layer rather than the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoValue {
    CreatedAt,
    ModifiedAt,
    /// Current date when the caller leaves the column out
    Today,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub non_negative: bool,
    pub default_sql: Option<&'static str>,
    pub auto: Option<AutoValue>,
}

impl Column {
    const fn new(name: &'static str, ty: ColumnType) -> Self {
        Column {
            name,
            ty,
            nullable: false,
            unique: false,
            non_negative: false,
            default_sql: None,
            auto: None,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Column::new(name, ColumnType::Integer)
    }

    pub const fn decimal(name: &'static str) -> Self {
        Column::new(name, ColumnType::Decimal)
    }

    pub const fn float(name: &'static str) -> Self {
        Column::new(name, ColumnType::Float)
    }

    pub const fn text(name: &'static str) -> Self {
        Column::new(name, ColumnType::Text)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Column::new(name, ColumnType::Bool).default_sql("0")
    }

    pub const fn date(name: &'static str) -> Self {
        Column::new(name, ColumnType::Date)
    }

    pub const fn uuid(name: &'static str) -> Self {
        Column::new(name, ColumnType::Uuid)
    }

    pub const fn choice(name: &'static str, choices: &'static [&'static str]) -> Self {
        Column::new(name, ColumnType::Choice(choices))
    }

    pub const fn reference(name: &'static str, target: EntityKind) -> Self {
        Column::new(name, ColumnType::Reference(target))
    }

    pub const fn created_at() -> Self {
        Column::new("created_at", ColumnType::Timestamp).auto(AutoValue::CreatedAt)
    }

    pub const fn modified_at() -> Self {
        Column::new("modified_at", ColumnType::Timestamp).auto(AutoValue::ModifiedAt)
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn non_negative(mut self) -> Self {
        self.non_negative = true;
        self
    }

    pub const fn default_sql(mut self, literal: &'static str) -> Self {
        self.default_sql = Some(literal);
        self
    }

    pub const fn auto(mut self, auto: AutoValue) -> Self {
        self.auto = Some(auto);
        self
    }

    /// Target kind when this column is a foreign key
    pub fn reference_target(&self) -> Option<EntityKind> {
        match self.ty {
            ColumnType::Reference(target) => Some(target),
            _ => None,
        }
    }

    /// `provider_id` → `provider`
    pub fn reference_field(&self) -> Option<&'static str> {
        self.reference_target()?;
        self.name.strip_suffix("_id")
    }
}

// ============================================================================
// RELATIONS
// ============================================================================

/// A to-many collection owned by a parent through a foreign key on the child
#[derive(Debug, Clone, Copy)]
pub struct ChildCollection {
    /// Field name in the nested payload (e.g. "order_provider_products")
    pub field: &'static str,
    pub child: EntityKind,
    /// Column on the child pointing back at the parent
    pub foreign_key: &'static str,
    /// Rows carry `amount` and `price` and count towards the subtotal
    pub line_items: bool,
}

impl ChildCollection {
    /// `workbuy_id` → `workbuy`
    pub fn parent_field(&self) -> &'static str {
        self.foreign_key
            .strip_suffix("_id")
            .unwrap_or(self.foreign_key)
    }
}

/// A reference that may be given by natural key instead of id
/// (`brand_name: "Bosch"` instead of `brand_id: 3`)
#[derive(Debug, Clone, Copy)]
pub struct NamedReference {
    pub field: &'static str,
    pub column: &'static str,
    pub target: EntityKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordering {
    ById,
    ByName,
}

// ============================================================================
// ENTITY SCHEMA
// ============================================================================

#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    pub columns: &'static [Column],
    pub children: &'static [ChildCollection],
    pub named_references: &'static [NamedReference],
    pub unique_together: &'static [&'static [&'static str]],
    pub ordering: Ordering,
}

impl EntitySchema {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn child(&self, field: &str) -> Option<&'static ChildCollection> {
        self.children.iter().find(|c| c.field == field)
    }

    /// Column holding the to-one reference exposed under `field`
    pub fn reference(&self, field: &str) -> Option<&'static Column> {
        self.columns
            .iter()
            .find(|c| c.reference_field() == Some(field))
    }

    pub fn references(&self) -> impl Iterator<Item = &'static Column> {
        self.columns.iter().filter(|c| c.reference_target().is_some())
    }

    pub fn named_reference(&self, field: &str) -> Option<&'static NamedReference> {
        self.named_references.iter().find(|r| r.field == field)
    }

    pub fn line_item_collections(&self) -> impl Iterator<Item = &'static ChildCollection> {
        self.children.iter().filter(|c| c.line_items)
    }

    pub fn has_line_items(&self) -> bool {
        self.children.iter().any(|c| c.line_items)
    }

    /// Batch aggregates own collections whose members carry their own line items
    pub fn is_batch(&self) -> bool {
        self.children
            .iter()
            .any(|c| c.child.schema().has_line_items())
    }

    /// Deepest chain of owned collections below this kind
    pub fn nesting_depth(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.child.schema().nesting_depth())
            .max()
            .unwrap_or(0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
