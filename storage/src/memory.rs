//! In-memory `PersonStore`, used by HTTP tests that do not need Postgres.

use async_trait::async_trait;
use domain::{
    NewPerson, Page, PageRequest, Person, PersonId, PersonPatch, PersonStore, SortDirection,
    SortField
};
use errors::StorageError;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    next_id: PersonId,
    rows: BTreeMap<PersonId, Person>
}

#[derive(Default)]
pub struct InMemoryPersonStore {
    inner: RwLock<Inner>
}

impl InMemoryPersonStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare(a: &Person, b: &Person, field: SortField) -> Ordering {
    match field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::Name => a.name.cmp(&b.name),
        SortField::Email => a.email.cmp(&b.email),
        SortField::Age => a.age.cmp(&b.age)
    }
}

#[async_trait]
impl PersonStore for InMemoryPersonStore {
    async fn create(&self, person: NewPerson) -> Result<Person, StorageError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let created = Person::from_new(inner.next_id, person);
        inner.rows.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: PersonId) -> Result<Option<Person>, StorageError> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Person>, StorageError> {
        // BTreeMap iterates in id order, so the first match is the lowest id.
        Ok(self
            .inner
            .read()
            .await
            .rows
            .values()
            .find(|p| p.email.as_deref() == Some(email))
            .cloned())
    }

    async fn list(&self, request: &PageRequest) -> Result<Page<Person>, StorageError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Person> = inner.rows.values().cloned().collect();

        if let Some(sort) = request.sort {
            rows.sort_by(|a, b| {
                let ordering = compare(a, b, sort.field);
                let ordering = match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse()
                };
                ordering.then(a.id.cmp(&b.id))
            });
        }

        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let items = rows
            .iter()
            .skip(offset)
            .take(request.size as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            number: request.page,
            size: request.size,
            total_elements: rows.len() as u64
        })
    }

    async fn count(&self) -> Result<u64, StorageError> {
        Ok(self.inner.read().await.rows.len() as u64)
    }

    async fn replace(
        &self,
        id: PersonId,
        person: NewPerson
    ) -> Result<Option<Person>, StorageError> {
        let mut inner = self.inner.write().await;
        Ok(inner.rows.get_mut(&id).map(|slot| {
            *slot = Person::from_new(id, person);
            slot.clone()
        }))
    }

    async fn patch(
        &self,
        id: PersonId,
        patch: PersonPatch
    ) -> Result<Option<Person>, StorageError> {
        let mut inner = self.inner.write().await;
        Ok(inner.rows.get_mut(&id).map(|slot| {
            patch.apply(slot);
            slot.clone()
        }))
    }

    async fn delete(&self, id: PersonId) -> Result<bool, StorageError> {
        Ok(self.inner.write().await.rows.remove(&id).is_some())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
