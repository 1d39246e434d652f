//! HTTP request handlers for the person resource.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection}
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse
};
use domain::{NewPerson, Person, PersonId, PersonPatch};
use serde::Serialize;
use std::sync::Arc;

use crate::dto::{EmailParams, ListParams, PersonCollection};
use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String
}

/// Returns 200 when the store answers a ping, 503 otherwise.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = state.store.ping().await {
        tracing::warn!(error = %e, "Database health check failed");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                database: "disconnected".to_string()
            })
        );
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            database: "connected".to_string()
        })
    )
}

fn person_id(path: std::result::Result<Path<PersonId>, PathRejection>) -> Result<PersonId> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// POST /person
pub async fn create_person(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<NewPerson>, JsonRejection>
) -> Result<impl IntoResponse> {
    let Json(person) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let created = state.store.create(person).await?;
    tracing::info!(id = created.id, "Person created");

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/person/{}", created.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(created)))
}

/// GET /person
pub async fn list_persons(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<ListParams>, QueryRejection>
) -> Result<Json<PersonCollection>> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let request = params.into_page_request()?;
    let page = state.store.list(&request).await?;
    Ok(Json(page.into()))
}

/// GET /person/{id}
pub async fn get_person(
    State(state): State<Arc<AppState>>,
    path: std::result::Result<Path<PersonId>, PathRejection>
) -> Result<Json<Person>> {
    let id = person_id(path)?;
    state
        .store
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::person_not_found(id))
}

/// PUT /person/{id}
pub async fn replace_person(
    State(state): State<Arc<AppState>>,
    path: std::result::Result<Path<PersonId>, PathRejection>,
    body: std::result::Result<Json<NewPerson>, JsonRejection>
) -> Result<Json<Person>> {
    let id = person_id(path)?;
    let Json(person) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .store
        .replace(id, person)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::person_not_found(id))
}

/// PATCH /person/{id}
pub async fn patch_person(
    State(state): State<Arc<AppState>>,
    path: std::result::Result<Path<PersonId>, PathRejection>,
    body: std::result::Result<Json<PersonPatch>, JsonRejection>
) -> Result<Json<Person>> {
    let id = person_id(path)?;
    let Json(patch) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .store
        .patch(id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::person_not_found(id))
}

/// DELETE /person/{id}
pub async fn delete_person(
    State(state): State<Arc<AppState>>,
    path: std::result::Result<Path<PersonId>, PathRejection>
) -> Result<StatusCode> {
    let id = person_id(path)?;
    if state.store.delete(id).await? {
        tracing::info!(id, "Person deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::person_not_found(id))
    }
}

/// GET /person/search/findByEmail?email=
///
/// Emails are not unique; the row with the lowest id wins.
pub async fn find_by_email(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<EmailParams>, QueryRejection>
) -> Result<Json<Person>> {
    let Query(EmailParams { email }) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    state
        .store
        .find_by_email(&email)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound {
            resource: "person with email",
            id: email
        })
}
