pub mod operations;
pub mod schema;

pub use operations::SqliteStore;
pub use schema::initialize_schema;
