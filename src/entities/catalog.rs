// 🏷️ Catalog entities - products and the names they hang on
//
// Brand and Appliance are looked up by natural key: a product payload may
// carry `brand_name: "Bosch"` and the normalizer resolves (or creates) the
// Brand row.

use crate::schema::{Column, EntityKind, EntitySchema, NamedReference, Ordering};

pub static APPLIANCE: EntitySchema = EntitySchema {
    kind: EntityKind::Appliance,
    table: "appliance",
    columns: &[Column::text("name").unique()],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ByName,
};

pub static BRAND: EntitySchema = EntitySchema {
    kind: EntityKind::Brand,
    table: "brand",
    columns: &[Column::text("name").unique()],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ByName,
};

pub static PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::Product,
    table: "product",
    columns: &[
        Column::text("code").unique(),
        Column::reference("brand_id", EntityKind::Brand).nullable(),
        Column::text("name"),
        Column::text("description").nullable(),
        Column::reference("appliance_id", EntityKind::Appliance).nullable(),
    ],
    children: &[],
    named_references: &[
        NamedReference {
            field: "brand_name",
            column: "brand_id",
            target: EntityKind::Brand,
        },
        NamedReference {
            field: "appliance_name",
            column: "appliance_id",
            target: EntityKind::Appliance,
        },
    ],
    unique_together: &[],
    ordering: Ordering::ById,
};

/// A product as sold by one provider, with that provider's code and price
pub static PROVIDER_PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::ProviderProduct,
    table: "provider_product",
    columns: &[
        Column::text("code"),
        Column::reference("provider_id", EntityKind::Provider),
        Column::reference("product_id", EntityKind::Product).nullable(),
        Column::decimal("price").non_negative(),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[&["provider_id", "code"]],
    ordering: Ordering::ById,
};

/// A product as quoted to one customer
pub static CUSTOMER_PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::CustomerProduct,
    table: "customer_product",
    columns: &[
        Column::text("code"),
        Column::reference("customer_id", EntityKind::Customer),
        Column::reference("product_id", EntityKind::Product).nullable(),
        Column::decimal("price").non_negative(),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[&["customer_id", "code"]],
    ordering: Ordering::ById,
};

/// Price-band markup table
pub static PERCENTAGE: EntitySchema = EntitySchema {
    kind: EntityKind::Percentage,
    table: "percentage",
    columns: &[
        Column::decimal("max_price_limit").unique().non_negative(),
        Column::float("increment"),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};
