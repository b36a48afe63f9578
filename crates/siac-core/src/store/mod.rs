// ── Reactive data store ──
//
// Reconciled entity storage with push-based change notification.

mod collection;
mod data_store;
mod push;
mod refresh;

pub use collection::{EntityChange, EntityCollection, Subscription, UpsertOutcome};
pub use data_store::DataStore;
pub use push::PushApplied;
pub use refresh::SnapshotDiff;
