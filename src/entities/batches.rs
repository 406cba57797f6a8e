// 🧺 Buy batches - orders and works grouped per customer and organization

use crate::schema::{ChildCollection, Column, EntityKind, EntitySchema, Ordering};

pub static WORK_BUY: EntitySchema = EntitySchema {
    kind: EntityKind::WorkBuy,
    table: "workbuy",
    columns: &[
        Column::created_at(),
        Column::modified_at(),
        Column::reference("customer_id", EntityKind::Customer),
        Column::reference("organization_id", EntityKind::Organization),
    ],
    children: &[
        ChildCollection {
            field: "orders",
            child: EntityKind::Order,
            foreign_key: "workbuy_id",
            line_items: false,
        },
        ChildCollection {
            field: "works",
            child: EntityKind::Work,
            foreign_key: "workbuy_id",
            line_items: false,
        },
    ],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static STORAGE_BUY: EntitySchema = EntitySchema {
    kind: EntityKind::StorageBuy,
    table: "storagebuy",
    columns: &[
        Column::created_at(),
        Column::modified_at(),
        Column::reference("storage_id", EntityKind::Storage),
        Column::reference("customer_id", EntityKind::Customer).nullable(),
        Column::reference("organization_id", EntityKind::Organization),
    ],
    children: &[ChildCollection {
        field: "orders",
        child: EntityKind::Order,
        foreign_key: "storagebuy_id",
        line_items: false,
    }],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};
