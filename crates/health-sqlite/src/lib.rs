mod error;
mod insert;
mod models;
mod open;
mod query;
mod schema;

pub use error::StoreError;
pub use models::*;
pub use open::Db;
