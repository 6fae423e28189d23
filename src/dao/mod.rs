/// Database model definitions.
pub mod models;
/// Record store abstraction and its backends.
pub mod record_store;
/// Storage error types shared by every backend.
pub mod storage;
