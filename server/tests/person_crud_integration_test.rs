//! End-to-end scenario against the compose environment: database plus
//! migration service, application configured from the resolved bindings.

use axum::{
    body::Body,
    http::{Request, StatusCode, header}
};
use domain::PersonStore;
use serde_json::{Value, json};
use server::{AppState, create_router};
use std::sync::Arc;
use storage::PersonRepository;
use testing::{DB_PORT, DB_SERVICE_NAME, TestSession};
use tower::ServiceExt;

const NAME: &str = "John Doe";
const EMAIL: &str = "john.doe@gmail.com";
const AGE: i32 = 25;

#[tokio::test]
async fn test_create_person_then_find_by_email() {
    testing::init_test_logging();
    if !testing::docker_available() {
        eprintln!("Skipping compose environment test: Docker not available");
        return;
    }

    let session = TestSession::global().unwrap();
    let config = session.app_config().await.unwrap();

    // The application must see the environment, never the built-in default.
    let environment = session.environment().await.unwrap();
    let binding = environment
        .running()
        .unwrap()
        .binding(DB_SERVICE_NAME, DB_PORT)
        .unwrap();
    assert!(!config.database.is_placeholder());
    assert_eq!(config.database.url, format!("postgres://{binding}/postgres"));

    let state = AppState::new(config.clone()).await.unwrap();
    let app = create_router(Arc::new(state));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/person")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"name": NAME, "email": EMAIL, "age": AGE}).to_string()
                ))
                .unwrap()
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let repository = PersonRepository::new(storage::connect(&config.database).await.unwrap());
    let person = repository.find_by_email(EMAIL).await.unwrap().unwrap();
    assert_eq!(person.name.as_deref(), Some(NAME));
    assert_eq!(person.email.as_deref(), Some(EMAIL));
    assert_eq!(person.age, Some(AGE));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/person/search/findByEmail?email={EMAIL}"))
                .body(Body::empty())
                .unwrap()
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["id"], person.id);
}
