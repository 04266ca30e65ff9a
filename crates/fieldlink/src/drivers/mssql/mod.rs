//! Microsoft SQL Server driver.

mod connector;

pub use connector::MssqlConnector;
