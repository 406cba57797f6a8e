// 📦 Purchase orders - what the workshop buys from providers
//
// An Order owns its registered lines (priced provider products), its
// unregistered lines (free text, price optional) and its payments.
// It may hang off a WorkBuy or a StorageBuy, or stand alone.

use crate::schema::{AutoValue, ChildCollection, Column, EntityKind, EntitySchema, Ordering};

/// X = cancelled, A = created, B = sent, C = received
pub const ORDER_STATES: &[&str] = &["X", "A", "B", "C"];

/// cash, transfer, check, debit, credit, wallet
pub const PAYMENT_METHODS: &[&str] = &["c", "t", "k", "d", "r", "w"];

pub static ORDER: EntitySchema = EntitySchema {
    kind: EntityKind::Order,
    table: "orders",
    columns: &[
        Column::created_at(),
        Column::modified_at(),
        Column::reference("provider_id", EntityKind::Provider),
        Column::reference("taxpayer_id", EntityKind::TaxPayer),
        Column::reference("claimant_id", EntityKind::Employee).nullable(),
        Column::boolean("authorized"),
        Column::boolean("include_iva"),
        Column::decimal("discount").nullable(),
        Column::choice("state", ORDER_STATES).default_sql("'A'"),
        Column::text("comment").nullable(),
        Column::reference("workbuy_id", EntityKind::WorkBuy).nullable(),
        Column::reference("storagebuy_id", EntityKind::StorageBuy).nullable(),
        Column::boolean("has_invoice"),
        Column::text("invoice_number").nullable(),
        Column::uuid("invoice_uuid").nullable(),
        Column::date("invoice_date").nullable(),
        Column::date("due").nullable(),
    ],
    children: &[
        ChildCollection {
            field: "order_provider_products",
            child: EntityKind::OrderProviderProduct,
            foreign_key: "order_id",
            line_items: true,
        },
        ChildCollection {
            field: "order_unregisteredproducts",
            child: EntityKind::OrderUnregisteredProduct,
            foreign_key: "order_id",
            line_items: true,
        },
        ChildCollection {
            field: "payments",
            child: EntityKind::OrderPayment,
            foreign_key: "order_id",
            line_items: false,
        },
    ],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static ORDER_PROVIDER_PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::OrderProviderProduct,
    table: "order_provider_product",
    columns: &[
        Column::reference("order_id", EntityKind::Order),
        Column::reference("provider_product_id", EntityKind::ProviderProduct),
        Column::integer("amount").non_negative(),
        Column::decimal("price").non_negative(),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static ORDER_UNREGISTERED_PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::OrderUnregisteredProduct,
    table: "order_unregisteredproduct",
    columns: &[
        Column::reference("order_id", EntityKind::Order),
        Column::text("code").nullable(),
        Column::text("description"),
        Column::integer("amount").non_negative(),
        Column::decimal("price").nullable().non_negative(),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static ORDER_PAYMENT: EntitySchema = EntitySchema {
    kind: EntityKind::OrderPayment,
    table: "order_payment",
    columns: &[
        Column::date("date").auto(AutoValue::Today),
        Column::decimal("amount").non_negative(),
        Column::reference("order_id", EntityKind::Order),
        Column::choice("method", PAYMENT_METHODS).default_sql("'c'"),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};
