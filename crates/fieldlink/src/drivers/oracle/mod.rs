//! Oracle driver (ODBC).

mod connector;

pub use connector::OracleConnector;
