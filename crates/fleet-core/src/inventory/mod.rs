//! Inventory: the INI host file and the operations on it.
//!
//! # Modules
//!
//! - [`model`]   - `Inventory` parse/serialize, `HostRecord`, line removal
//! - [`request`] - `AddHostRequest` validation
//! - [`store`]   - `InventoryStore` (file-backed, per-path lock)
//! - [`error`]   - `InventoryError` / `InventoryResult`

pub mod error;
pub mod model;
pub mod request;
pub mod store;

pub use error::{InventoryError, InventoryResult};
pub use model::{
    remove_host_lines, GroupSection, HostEntry, HostRecord, Inventory, DEFAULT_GROUP,
    UNKNOWN_ADDRESS,
};
pub use request::{validate_hostname, AddHostRequest};
pub use store::InventoryStore;
