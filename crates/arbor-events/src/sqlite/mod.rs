//! `SQLite` backing for the event store.

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory, verify_pragmas,
};
pub use migrations::{current_version, latest_version, run_migrations};
