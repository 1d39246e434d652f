use async_trait::async_trait;
use errors::StorageError;

use crate::types::{NewPerson, Page, PageRequest, Person, PersonId, PersonPatch};

/// Persistence operations over the single `Person` entity.
///
/// Lookups that can miss return `Ok(None)`/`Ok(false)`; `StorageError` is
/// reserved for backend failures.
#[async_trait]
pub trait PersonStore: Send + Sync {
    /// Inserts a person and returns it with its server-generated id.
    async fn create(&self, person: NewPerson) -> Result<Person, StorageError>;

    async fn find_by_id(&self, id: PersonId) -> Result<Option<Person>, StorageError>;

    /// Email is not unique; when several rows share it the lowest id wins.
    async fn find_by_email(&self, email: &str) -> Result<Option<Person>, StorageError>;

    async fn list(&self, request: &PageRequest) -> Result<Page<Person>, StorageError>;

    async fn count(&self) -> Result<u64, StorageError>;

    /// Overwrites every mutable field. The id never changes.
    async fn replace(
        &self,
        id: PersonId,
        person: NewPerson
    ) -> Result<Option<Person>, StorageError>;

    async fn patch(
        &self,
        id: PersonId,
        patch: PersonPatch
    ) -> Result<Option<Person>, StorageError>;

    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: PersonId) -> Result<bool, StorageError>;

    /// Cheap connectivity check used by the health endpoint.
    async fn ping(&self) -> Result<(), StorageError>;
}
