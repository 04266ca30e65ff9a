//! PostgreSQL driver.

mod connector;

pub use connector::PostgresConnector;
