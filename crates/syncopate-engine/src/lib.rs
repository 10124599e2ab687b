//! The SyncopateDB storage engine: id generation strategies, the schema
//! registry, the entity store with index and uniqueness maintenance, the
//! query and join executors, the representation layer, and the optional
//! write-ahead log.

pub mod db;
pub mod idgen;
pub mod registry;
pub mod represent;
pub mod store;
pub mod wal;

mod executor;
mod join;

pub use db::{Database, DatabaseConfig};
pub use registry::{SchemaChange, SchemaRegistry};
pub use represent::RenderOptions;
pub use store::EntityStore;
