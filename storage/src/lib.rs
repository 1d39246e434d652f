//! # Storage Layer
//!
//! PostgreSQL persistence for the `Person` entity, plus an in-memory store
//! with the same behaviour for tests that do not need a database.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryPersonStore;
pub use postgres::{MIGRATION_SQL, PERSON_SCHEMA, PersonRepository, connect};
