//! # Person Registry Core
//!
//! Shared types and traits for the person registry.
//!
//! This crate provides:
//! - The `Person` entity with its create/replace and patch payloads
//! - Paging and sorting requests for listing
//! - The `PersonStore` trait implemented by the storage backends

pub mod traits;
pub mod types;

pub use traits::PersonStore;
pub use types::{
    DomainError, NewPerson, Page, PageRequest, Person, PersonId, PersonPatch, Sort,
    SortDirection, SortField
};
