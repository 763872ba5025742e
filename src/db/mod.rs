pub mod models;
pub mod round_store;

pub use round_store::SqliteStore;
