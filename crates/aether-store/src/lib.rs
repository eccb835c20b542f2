pub mod database;
pub mod error;
pub mod messages;
pub mod prompts;
pub mod rooms;
pub mod row_helpers;
pub mod runs;
pub mod schema;
pub mod triggers;
pub mod users;

pub use database::Database;
pub use error::StoreError;
