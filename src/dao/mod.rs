/// Remote store boundary and its backends.
pub mod gateway;
/// Device-local key-value storage.
pub mod local_store;
/// Records exchanged with the remote store.
pub mod models;
/// Per-match snapshots on top of the local store.
pub mod snapshot_store;
/// Local storage errors.
pub mod storage;
