pub mod queue;
pub mod store;

pub use queue::{persist_result, spawn_workers, PersistenceQueue, RetryPolicy};
pub use store::{items_since, CategorySnapshot, DurableRecord, MemoryStore, SignalStore};
