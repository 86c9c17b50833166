//! SQLite-backed conversation store: sessions, messages, collected fields,
//! leads, and meetings. Repository traits live in [`repositories`]; each has
//! a SQL implementation and an in-memory double for tests.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
