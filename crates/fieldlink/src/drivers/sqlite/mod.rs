//! SQLite driver.

mod connector;

pub use connector::SqliteConnector;
