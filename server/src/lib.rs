//! # Person Server
//!
//! HTTP CRUD surface over the `person` table.
//!
//! ## Endpoints
//!
//! - `POST /person` - Create a person (201 + `Location`)
//! - `GET /person` - Paged listing (`page`, `size`, `sort=field,dir`)
//! - `GET /person/{id}` - Read one person
//! - `PUT /person/{id}` - Replace every field
//! - `PATCH /person/{id}` - Update the fields present in the body
//! - `DELETE /person/{id}` - Remove a person
//! - `GET /person/search/findByEmail?email=` - Lookup by email
//! - `GET /health` - Health check endpoint

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use server::PersonServer;
pub use state::AppState;
