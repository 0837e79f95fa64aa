mod datastore;
mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use datastore::SqliteDataStore;
pub use error::*;
pub use models::{NewPriceRecord, PriceRecord, PriceRecordRow};
pub use pool::*;
pub use repositories::*;
