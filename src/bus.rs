//! Victron D-Bus surface
//!
//! One service per charger instance, VeDbus-compatible: every value lives
//! at its own object path implementing `com.victronenergy.BusItem`, the
//! root answers `GetItems`, and intermediate segments answer subtree reads.
//! External writes are validated against the device before they are stored,
//! via the [`ExternalWriteHandler`] registered on the service.

pub mod items;
pub mod paths;
pub mod root;
pub mod service;
pub mod shared;
pub(crate) mod util;

pub use items::BusItem;
pub use paths::PropertyPath;
pub use root::{RootBus, TreeNode};
pub use service::DbusService;
pub use shared::BusSharedState;

use async_trait::async_trait;

/// Decides the fate of an external `SetValue`. Called on the zbus task with
/// no locks held; implementations may do device I/O. Returning `false`
/// rejects the write and leaves the published value unchanged.
#[async_trait]
pub trait ExternalWriteHandler: Send + Sync {
    async fn handle_write(&self, path: PropertyPath, value: serde_json::Value) -> bool;
}
