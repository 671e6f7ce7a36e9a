pub mod batch;
pub mod manager;
pub mod memory;
pub mod models;
pub mod reference;
pub mod store;

pub use batch::Batcher;
pub use manager::{DatabaseError, MongoStore};
pub use memory::MemoryStore;
pub use reference::{resolve_id, IdError};
pub use store::{DocumentStore, FindQuery};
