pub mod base;
pub mod disk;
pub mod memory;

pub use base::{BlobStore, Datastore, StoreError, StoreResult};
pub use disk::{DiskBlobStore, DiskStore};
pub use memory::{MemoryBlobStore, MemoryStore};
