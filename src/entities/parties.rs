// 🤝 Parties - who we buy from, who we sell to, who does the work

use crate::schema::{ChildCollection, Column, EntityKind, EntitySchema, Ordering};

pub static PROVIDER: EntitySchema = EntitySchema {
    kind: EntityKind::Provider,
    table: "provider",
    columns: &[Column::text("name").unique()],
    children: &[
        ChildCollection {
            field: "contacts",
            child: EntityKind::ProviderContact,
            foreign_key: "provider_id",
            line_items: false,
        },
        ChildCollection {
            field: "provider_products",
            child: EntityKind::ProviderProduct,
            foreign_key: "provider_id",
            line_items: false,
        },
    ],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ByName,
};

pub static PROVIDER_CONTACT: EntitySchema = EntitySchema {
    kind: EntityKind::ProviderContact,
    table: "provider_contact",
    columns: &[
        Column::reference("provider_id", EntityKind::Provider),
        Column::text("name"),
        Column::text("department").nullable().default_sql("''"),
        Column::text("email").nullable().default_sql("''"),
        Column::text("phone").nullable().default_sql("''"),
        Column::boolean("for_orders"),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static CUSTOMER: EntitySchema = EntitySchema {
    kind: EntityKind::Customer,
    table: "customer",
    columns: &[Column::text("name").unique()],
    children: &[
        ChildCollection {
            field: "contacts",
            child: EntityKind::CustomerContact,
            foreign_key: "customer_id",
            line_items: false,
        },
        ChildCollection {
            field: "customer_products",
            child: EntityKind::CustomerProduct,
            foreign_key: "customer_id",
            line_items: false,
        },
    ],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ByName,
};

pub static CUSTOMER_CONTACT: EntitySchema = EntitySchema {
    kind: EntityKind::CustomerContact,
    table: "customer_contact",
    columns: &[
        Column::reference("customer_id", EntityKind::Customer),
        Column::text("name"),
        Column::text("department").nullable().default_sql("''"),
        Column::text("email").nullable().default_sql("''"),
        Column::text("phone").nullable().default_sql("''"),
        Column::boolean("for_quotation"),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static EMPLOYEE: EntitySchema = EntitySchema {
    kind: EntityKind::Employee,
    table: "employee",
    columns: &[
        Column::text("name").unique(),
        Column::text("phone").nullable().unique(),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ByName,
};

pub static TAXPAYER: EntitySchema = EntitySchema {
    kind: EntityKind::TaxPayer,
    table: "taxpayer",
    columns: &[
        Column::text("name").unique(),
        Column::text("key").unique(),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ByName,
};

/// Organizations prefix the display number of their batches ("WB" + 12)
pub static ORGANIZATION: EntitySchema = EntitySchema {
    kind: EntityKind::Organization,
    table: "organization",
    columns: &[
        Column::text("name").unique(),
        Column::text("prefix").nullable().unique(),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ByName,
};

pub static STORAGE_TYPE: EntitySchema = EntitySchema {
    kind: EntityKind::StorageType,
    table: "storagetype",
    columns: &[Column::text("name").unique()],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static STORAGE: EntitySchema = EntitySchema {
    kind: EntityKind::Storage,
    table: "storage",
    columns: &[
        Column::reference("organization_id", EntityKind::Organization),
        Column::reference("storagetype_id", EntityKind::StorageType),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[&["organization_id", "storagetype_id"]],
    ordering: Ordering::ById,
};
