//! Testing utilities for the MySQL sink
//!
//! Docker-managed MySQL servers for integration tests.

pub mod container;

pub use container::MySQLContainer;
