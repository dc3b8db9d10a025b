mod blobs;
mod store;
mod txn;

pub use blobs::{KeysView, ReadView};
pub use store::Store;
pub use txn::{Transaction, TxnId, TxnState};
