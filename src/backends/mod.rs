//! External collaborators: execution engine, document store, notifier.

pub mod engine;
pub mod notifier;
pub mod sqlite;
pub mod store;

pub use engine::QueryEngine;
pub use notifier::{LogNotifier, NotificationLevel, NotificationMessage, Notifier};
pub use sqlite::SqliteStore;
pub use store::{DocumentStore, FieldFilter, MemoryStore};
