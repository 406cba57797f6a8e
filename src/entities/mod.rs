// Entity Registry
//
// One static `EntitySchema` per kind, grouped by domain. `ALL` lists them in
// dependency order: a table only references tables declared before it, so
// DDL can be emitted front to back.

pub mod batches;
pub mod catalog;
pub mod orders;
pub mod parties;
pub mod works;

use crate::schema::{EntityKind, EntitySchema};

pub use orders::{ORDER_STATES, PAYMENT_METHODS};
pub use works::WORK_STATES;

pub static ALL: &[&EntitySchema] = &[
    &catalog::APPLIANCE,
    &catalog::BRAND,
    &parties::TAXPAYER,
    &parties::ORGANIZATION,
    &parties::STORAGE_TYPE,
    &parties::STORAGE,
    &parties::EMPLOYEE,
    &parties::PROVIDER,
    &parties::PROVIDER_CONTACT,
    &parties::CUSTOMER,
    &parties::CUSTOMER_CONTACT,
    &catalog::PRODUCT,
    &catalog::PROVIDER_PRODUCT,
    &catalog::CUSTOMER_PRODUCT,
    &catalog::PERCENTAGE,
    &batches::WORK_BUY,
    &batches::STORAGE_BUY,
    &orders::ORDER,
    &orders::ORDER_PROVIDER_PRODUCT,
    &orders::ORDER_UNREGISTERED_PRODUCT,
    &orders::ORDER_PAYMENT,
    &works::WORK,
    &works::WORK_PRODUCT,
    &works::WORK_CUSTOMER_PRODUCT,
    &works::WORK_UNREGISTERED_PRODUCT,
    &works::WORK_EMPLOYEE,
    &works::WORK_PAYMENT,
];

pub fn schema_of(kind: EntityKind) -> &'static EntitySchema {
    match kind {
        EntityKind::Appliance => &catalog::APPLIANCE,
        EntityKind::Brand => &catalog::BRAND,
        EntityKind::TaxPayer => &parties::TAXPAYER,
        EntityKind::Organization => &parties::ORGANIZATION,
        EntityKind::StorageType => &parties::STORAGE_TYPE,
        EntityKind::Storage => &parties::STORAGE,
        EntityKind::Employee => &parties::EMPLOYEE,
        EntityKind::Provider => &parties::PROVIDER,
        EntityKind::ProviderContact => &parties::PROVIDER_CONTACT,
        EntityKind::Customer => &parties::CUSTOMER,
        EntityKind::CustomerContact => &parties::CUSTOMER_CONTACT,
        EntityKind::Product => &catalog::PRODUCT,
        EntityKind::ProviderProduct => &catalog::PROVIDER_PRODUCT,
        EntityKind::CustomerProduct => &catalog::CUSTOMER_PRODUCT,
        EntityKind::Percentage => &catalog::PERCENTAGE,
        EntityKind::WorkBuy => &batches::WORK_BUY,
        EntityKind::StorageBuy => &batches::STORAGE_BUY,
        EntityKind::Order => &orders::ORDER,
        EntityKind::OrderProviderProduct => &orders::ORDER_PROVIDER_PRODUCT,
        EntityKind::OrderUnregisteredProduct => &orders::ORDER_UNREGISTERED_PRODUCT,
        EntityKind::OrderPayment => &orders::ORDER_PAYMENT,
        EntityKind::Work => &works::WORK,
        EntityKind::WorkProduct => &works::WORK_PRODUCT,
        EntityKind::WorkCustomerProduct => &works::WORK_CUSTOMER_PRODUCT,
        EntityKind::WorkUnregisteredProduct => &works::WORK_UNREGISTERED_PRODUCT,
        EntityKind::WorkEmployee => &works::WORK_EMPLOYEE,
        EntityKind::WorkPayment => &works::WORK_PAYMENT,
    }
}

/// The collection on `kind`'s parent that owns rows through `column`, if any
pub fn owning_collection(
    kind: EntityKind,
    column: &str,
) -> Option<&'static crate::schema::ChildCollection> {
    ALL.iter()
        .flat_map(|s| s.children.iter())
        .find(|c| c.child == kind && c.foreign_key == column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_covers_every_kind() {
        assert_eq!(ALL.len(), 27);
        for schema in ALL {
            assert_eq!(schema_of(schema.kind).table, schema.table);
        }
    }

    #[test]
    fn test_tables_are_unique() {
        let tables: HashSet<_> = ALL.iter().map(|s| s.table).collect();
        assert_eq!(tables.len(), ALL.len());
    }

    #[test]
    fn test_reference_targets_declared_first() {
        for (pos, schema) in ALL.iter().enumerate() {
            for col in schema.references() {
                let target = col.reference_target().unwrap();
                let target_pos = ALL.iter().position(|s| s.kind == target).unwrap();
                assert!(target_pos <= pos, "{}.{}", schema.table, col.name);
            }
        }
    }

    #[test]
    fn test_child_foreign_keys_exist() {
        for schema in ALL {
            for child in schema.children {
                let col = child.child.schema().column(child.foreign_key);
                assert!(col.is_some(), "{}.{}", schema.table, child.field);
                assert_eq!(col.unwrap().reference_target(), Some(schema.kind));
            }
        }
    }

    #[test]
    fn test_nesting_never_exceeds_two() {
        for schema in ALL {
            assert!(schema.nesting_depth() <= 2, "{}", schema.table);
        }
        assert_eq!(EntityKind::WorkBuy.schema().nesting_depth(), 2);
    }

    #[test]
    fn test_owning_collection() {
        let owner = owning_collection(EntityKind::Order, "workbuy_id").unwrap();
        assert_eq!(owner.field, "orders");
        assert!(owning_collection(EntityKind::Order, "provider_id").is_none());
    }
}
