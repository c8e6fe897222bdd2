//! [`GridStore`](crate::store::GridStore) implementations.

pub mod dry_run;
pub mod file;
pub mod memory;
pub mod sheets;

pub use dry_run::DryRun;
pub use file::FileStore;
pub use memory::{MemoryStore, WriteRecord};
pub use sheets::SheetsStore;
