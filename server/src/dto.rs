//! Request and response shapes that are not domain types.

use domain::{Page, PageRequest, Person, Sort};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Result};

/// Query string of `GET /person`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>
}

impl ListParams {
    pub fn into_page_request(self) -> Result<PageRequest> {
        let request = PageRequest::new(self.page.unwrap_or(0), self.size.unwrap_or(0));
        match self.sort.as_deref().filter(|s| !s.is_empty()) {
            Some(sort) => {
                let sort: Sort = sort
                    .parse()
                    .map_err(|e: domain::DomainError| ApiError::BadRequest(e.to_string()))?;
                Ok(request.with_sort(sort))
            }
            None => Ok(request)
        }
    }
}

/// Query string of `GET /person/search/findByEmail`.
#[derive(Debug, Deserialize)]
pub struct EmailParams {
    pub email: String
}

/// Paged collection body, keyed by the collection relation name.
#[derive(Debug, Serialize)]
pub struct PersonCollection {
    #[serde(rename = "_embedded")]
    pub embedded: EmbeddedPersons,
    pub page: PageMetadata
}

#[derive(Debug, Serialize)]
pub struct EmbeddedPersons {
    pub person: Vec<Person>
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
    pub number: u32
}

impl From<Page<Person>> for PersonCollection {
    fn from(page: Page<Person>) -> Self {
        let metadata = PageMetadata {
            size: page.size,
            total_elements: page.total_elements,
            total_pages: page.total_pages(),
            number: page.number
        };
        Self {
            embedded: EmbeddedPersons { person: page.items },
            page: metadata
        }
    }
}
