use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Server-generated identifier of a person. Immutable once assigned.
pub type PersonId = i32;

/// Default page size when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on a single page.
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid sort field: {field}")]
    InvalidSortField { field: String },

    #[error("Invalid sort direction: {direction}")]
    InvalidSortDirection { direction: String }
}

/// A stored person.
///
/// Every field except the id is nullable, matching the table columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i32>
}

impl Person {
    #[must_use]
    pub fn from_new(id: PersonId, person: NewPerson) -> Self {
        Self {
            id,
            name: person.name,
            email: person.email,
            age: person.age
        }
    }
}

/// Payload for create (`POST`) and full replacement (`PUT`).
///
/// Unknown fields are ignored, so a client-supplied `id` is dropped rather
/// than rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPerson {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i32>
}

impl NewPerson {
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>, age: i32) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
            age: Some(age)
        }
    }
}

/// Partial update (`PATCH`).
///
/// The outer `Option` says whether the field was present in the payload,
/// the inner one carries an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonPatch {
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub age: Option<Option<i32>>
}

impl PersonPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.age.is_none()
    }

    /// Writes every present field onto `person`.
    pub fn apply(&self, person: &mut Person) {
        if let Some(name) = &self.name {
            person.name.clone_from(name);
        }
        if let Some(email) = &self.email {
            person.email.clone_from(email);
        }
        if let Some(age) = self.age {
            person.age = age;
        }
    }
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Name,
    Email,
    Age
}

impl SortField {
    /// Column name. Only ever one of these literals, so safe to splice into SQL.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Email => "email",
            Self::Age => "age"
        }
    }
}

impl FromStr for SortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            "email" => Ok(Self::Email),
            "age" => Ok(Self::Age),
            _ => Err(DomainError::InvalidSortField {
                field: s.to_string()
            })
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc
}

impl SortDirection {
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC"
        }
    }
}

impl FromStr for SortDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(DomainError::InvalidSortDirection {
                direction: s.to_string()
            })
        }
    }
}

/// Sort order in the `field[,asc|desc]` form used by the list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection
}

impl FromStr for Sort {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = match s.split_once(',') {
            Some((field, direction)) => (field, direction.parse()?),
            None => (s, SortDirection::default())
        };
        Ok(Self {
            field: field.parse()?,
            direction
        })
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{}",
            self.field.column(),
            self.direction.keyword().to_ascii_lowercase()
        )
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: Option<Sort>
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: None
        }
    }
}

impl PageRequest {
    /// A size of zero falls back to the default; anything above the cap is clamped.
    #[must_use]
    pub fn new(page: u32, size: u32) -> Self {
        let size = match size {
            0 => DEFAULT_PAGE_SIZE,
            s => s.min(MAX_PAGE_SIZE)
        };
        Self {
            page,
            size,
            sort: None
        }
    }

    #[must_use]
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

/// One page of results plus the totals needed for navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total_elements: u64
}

impl<T> Page<T> {
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total_elements.div_ceil(u64::from(self.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_person_ignores_client_id() {
        let person: NewPerson =
            serde_json::from_str(r#"{"id": 99, "name": "John Doe", "age": 25}"#).unwrap();
        assert_eq!(person.name.as_deref(), Some("John Doe"));
        assert_eq!(person.email, None);
        assert_eq!(person.age, Some(25));
    }

    #[test]
    fn test_patch_distinguishes_absent_from_null() {
        let patch: PersonPatch = serde_json::from_str(r#"{"email": null, "age": 30}"#).unwrap();
        assert_eq!(patch.name, None);
        assert_eq!(patch.email, Some(None));
        assert_eq!(patch.age, Some(Some(30)));

        let mut person = Person::from_new(1, NewPerson::new("Jane", "jane@example.com", 29));
        patch.apply(&mut person);
        assert_eq!(person.name.as_deref(), Some("Jane"));
        assert_eq!(person.email, None);
        assert_eq!(person.age, Some(30));
        assert_eq!(person.id, 1);
    }

    #[test]
    fn test_empty_patch() {
        let patch: PersonPatch = serde_json::from_str("{}").unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn test_sort_parsing() {
        let sort: Sort = "name,desc".parse().unwrap();
        assert_eq!(sort.field, SortField::Name);
        assert_eq!(sort.direction, SortDirection::Desc);

        let sort: Sort = "age".parse().unwrap();
        assert_eq!(sort.direction, SortDirection::Asc);
        assert_eq!(sort.to_string(), "age,asc");

        assert_eq!(
            "password".parse::<Sort>(),
            Err(DomainError::InvalidSortField {
                field: "password".to_string()
            })
        );
        assert!("name,sideways".parse::<Sort>().is_err());
    }

    #[test]
    fn test_page_request_bounds() {
        assert_eq!(PageRequest::new(0, 0).size, DEFAULT_PAGE_SIZE);
        assert_eq!(PageRequest::new(0, 5000).size, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(3, 10).offset(), 30);
    }

    #[test]
    fn test_total_pages() {
        let page: Page<Person> = Page {
            items: Vec::new(),
            number: 0,
            size: 20,
            total_elements: 41
        };
        assert_eq!(page.total_pages(), 3);

        let empty: Page<Person> = Page {
            items: Vec::new(),
            number: 0,
            size: 20,
            total_elements: 0
        };
        assert_eq!(empty.total_pages(), 0);
    }
}
