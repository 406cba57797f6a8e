// 🔧 Works - jobs performed for a customer
//
// Line items come in three flavours (catalogue product, customer-specific
// product, free text). Employees and payments are owned as well but do not
// count towards the subtotal.

use super::orders::PAYMENT_METHODS;
use crate::schema::{AutoValue, ChildCollection, Column, EntityKind, EntitySchema, Ordering};

/// quoted, received, in progress, cancelled, finished, warranty
pub const WORK_STATES: &[&str] = &["Q", "R", "P", "X", "F", "W"];

pub static WORK: EntitySchema = EntitySchema {
    kind: EntityKind::Work,
    table: "work",
    columns: &[
        Column::created_at(),
        Column::modified_at(),
        Column::text("number"),
        Column::reference("taxpayer_id", EntityKind::TaxPayer),
        Column::text("unit").nullable(),
        Column::text("model").nullable(),
        Column::boolean("authorized"),
        Column::boolean("include_iva"),
        Column::decimal("discount").nullable(),
        Column::choice("state", WORK_STATES).default_sql("'Q'"),
        Column::text("comment").nullable(),
        Column::reference("workbuy_id", EntityKind::WorkBuy),
        Column::boolean("has_invoice"),
        Column::text("invoice_number").nullable(),
        Column::uuid("invoice_uuid").nullable(),
        Column::date("invoice_date").nullable(),
        Column::date("due").nullable(),
    ],
    children: &[
        ChildCollection {
            field: "work_products",
            child: EntityKind::WorkProduct,
            foreign_key: "work_id",
            line_items: true,
        },
        ChildCollection {
            field: "work_customer_products",
            child: EntityKind::WorkCustomerProduct,
            foreign_key: "work_id",
            line_items: true,
        },
        ChildCollection {
            field: "work_unregisteredproducts",
            child: EntityKind::WorkUnregisteredProduct,
            foreign_key: "work_id",
            line_items: true,
        },
        ChildCollection {
            field: "work_employees",
            child: EntityKind::WorkEmployee,
            foreign_key: "work_id",
            line_items: false,
        },
        ChildCollection {
            field: "payments",
            child: EntityKind::WorkPayment,
            foreign_key: "work_id",
            line_items: false,
        },
    ],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static WORK_PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::WorkProduct,
    table: "work_product",
    columns: &[
        Column::reference("work_id", EntityKind::Work),
        Column::reference("product_id", EntityKind::Product),
        Column::integer("amount").non_negative(),
        Column::decimal("price").non_negative(),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static WORK_CUSTOMER_PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::WorkCustomerProduct,
    table: "work_customer_product",
    columns: &[
        Column::reference("work_id", EntityKind::Work),
        Column::reference("customer_product_id", EntityKind::CustomerProduct),
        Column::integer("amount").non_negative(),
        Column::decimal("price").non_negative(),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static WORK_UNREGISTERED_PRODUCT: EntitySchema = EntitySchema {
    kind: EntityKind::WorkUnregisteredProduct,
    table: "work_unregisteredproduct",
    columns: &[
        Column::reference("work_id", EntityKind::Work),
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

pub static WORK_EMPLOYEE: EntitySchema = EntitySchema {
    kind: EntityKind::WorkEmployee,
    table: "work_employee",
    columns: &[
        Column::reference("work_id", EntityKind::Work),
        Column::reference("employee_id", EntityKind::Employee),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};

pub static WORK_PAYMENT: EntitySchema = EntitySchema {
    kind: EntityKind::WorkPayment,
    table: "work_payment",
    columns: &[
        Column::date("date").auto(AutoValue::Today),
        Column::decimal("amount").non_negative(),
        Column::reference("work_id", EntityKind::Work),
        Column::choice("method", PAYMENT_METHODS).default_sql("'c'"),
    ],
    children: &[],
    named_references: &[],
    unique_together: &[],
    ordering: Ordering::ById,
};
