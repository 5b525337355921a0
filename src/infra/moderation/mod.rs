pub mod in_memory;
pub mod json_store;
pub mod sqlite_store;

pub use in_memory::{InMemoryContentStore, InMemoryModerationStore};
pub use json_store::JsonModerationStore;
pub use sqlite_store::{SqliteContentStore, SqliteModerationStore};
