// Workshop Back-Office - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod schema;         // Entity registry types
pub mod entities;       // The 27 entity kinds
pub mod error;
pub mod money;
pub mod db;             // SQLite storage, DDL from the registry
pub mod normalizer;     // Payload → storable columns
pub mod reconciliation; // Exact-set child collections
pub mod tree;           // Materialized read trees
pub mod aggregates;     // Subtotal / total / earnings
pub mod auth;
pub mod config;
pub mod resources;      // The resource table and its five operations
pub mod work_order;
pub mod import;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use schema::{Column, ColumnType, EntityKind, EntitySchema};
pub use error::{BackofficeError, Result};
pub use db::{open_database, setup_database, Record};
pub use reconciliation::{ReconciliationEngine, ReconciliationReport};
pub use aggregates::{compute_batch, compute_totals, BatchTotals, Totals};
pub use auth::{AllowAll, Authenticator, Principal, TokenAuthenticator};
pub use config::{Config, TokenConfig};
pub use resources::{find_resource, ListParams, ResourceDescriptor, RESOURCES};
pub use work_order::{generate_orders, WorkOrderRequest};
pub use import::{import_products, load_product_csv, ImportSummary, ProductRow};

#[cfg(feature = "server")]
pub use api::{router, AppState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
