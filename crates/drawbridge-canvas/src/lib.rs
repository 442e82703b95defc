//! Canvas state: the canonical ordered element list shared by every viewer.
//!
//! [`CanvasStore`] is the only place elements are mutated; everything else
//! sees copies. [`persist`] snapshots the store to an external file on a
//! best-effort basis.

pub mod persist;
pub mod store;

pub use persist::{JsonFileSnapshotStore, SnapshotStore, spawn_persister};
pub use store::CanvasStore;
