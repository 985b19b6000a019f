//! Local-first client sync for the document endpoints.
//!
//! Edits land in a durable local cache first and reach the server through a
//! debounced background push. Loads try the server, fall back to the cache,
//! and run every value through its dataset's migration.

pub mod cache;
pub mod envelope;
pub mod finance;
pub mod loader;
pub mod machine;
pub mod pipeline;
pub mod remote;

pub use cache::{FileCache, LocalCache, MemoryCache};
pub use envelope::{upgrade, Envelope, Migrated, Migration};
pub use finance::FinanceMigration;
pub use loader::{load, Loaded, Source};
pub use machine::{SyncHandle, SyncState};
pub use pipeline::{Board, BoardMigration, DropTarget};
pub use remote::{HttpRemote, RemoteStore, Resource};

/// Migration for a resource; keyed storage has no schema history
pub fn migration_for(resource: &Resource) -> &'static dyn Migration {
    match resource {
        Resource::FinanceData => &FinanceMigration,
        Resource::PipelineBoard => &BoardMigration,
        Resource::PipelineData | Resource::Storage(_) => &Unversioned,
    }
}

/// Identity migration for documents that never changed shape
pub struct Unversioned;

impl Migration for Unversioned {
    fn current_version(&self) -> u32 {
        1
    }

    fn migrate(&self, _from_version: u32, payload: serde_json::Value) -> serde_json::Value {
        payload
    }
}
