// Course generation, listing, details and deletion over HTTP
use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::{create_test_app, create_test_app_with, send, test_config, token_for, FakeGenerator};

#[tokio::test]
async fn test_generate_course_returns_ordered_hierarchy() {
    let app = create_test_app();
    let token = token_for("alice");

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/courses/generate",
        Some(token.as_str()),
        Some(json!({ "topic": "Linear Algebra" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["course"]["title"], "Linear Algebra Course");
    assert_eq!(body["course"]["createdBy"], "alice");

    let modules = body["modules"].as_array().unwrap();
    let titles: Vec<&str> = modules.iter().map(|m| m["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Foundations", "Techniques", "Applications"]);

    for (idx, module) in modules.iter().enumerate() {
        assert_eq!(module["order"], idx as u64 + 1);
        let orders: Vec<u64> = module["lessons"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["orderNo"].as_u64().unwrap())
            .collect();
        let expected: Vec<u64> = (1..=orders.len() as u64).collect();
        assert_eq!(orders, expected);
    }
}

#[tokio::test]
async fn test_short_topic_is_rejected() {
    let app = create_test_app();
    let token = token_for("alice");

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/courses/generate",
        Some(token.as_str()),
        Some(json!({ "topic": "  ab " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert_eq!(
        body["message"],
        "Topic is required and must be at least 3 characters"
    );
    assert_eq!(app.store.module_count().await, 0);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = create_test_app();
    let token = token_for("alice");

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/courses/generate",
        Some(token.as_str()),
        Some(json!({ "subject": "Linear Algebra" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn test_generation_failure_is_500_without_details() {
    let app = create_test_app_with(test_config(), FakeGenerator { fail_outline: true });
    let token = token_for("alice");

    let (status, body) = send(
        &app.router,
        "POST",
        "/api/courses/generate",
        Some(token.as_str()),
        Some(json!({ "topic": "Linear Algebra" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body["message"].as_str().unwrap().contains("overloaded"));
}

#[tokio::test]
async fn test_list_courses_is_per_owner() {
    let app = create_test_app();
    let alice = token_for("alice");
    let bob = token_for("bob");

    for topic in ["Linear Algebra", "Graph Theory"] {
        send(
            &app.router,
            "POST",
            "/api/courses/generate",
            Some(alice.as_str()),
            Some(json!({ "topic": topic })),
        )
        .await;
    }

    let (status, body) = send(&app.router, "GET", "/api/courses", Some(alice.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Graph Theory Course", "Linear Algebra Course"]);

    let (_, body) = send(&app.router, "GET", "/api/courses", Some(bob.as_str()), None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_course_details_are_public() {
    let app = create_test_app();
    let token = token_for("alice");

    let (_, created) = send(
        &app.router,
        "POST",
        "/api/courses/generate",
        Some(token.as_str()),
        Some(json!({ "topic": "Linear Algebra" })),
    )
    .await;
    let course_id = created["course"]["id"].as_str().unwrap();

    let uri = format!("/api/courses/{}", course_id);
    let (status, first) = send(&app.router, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send(&app.router, "GET", &uri, None, None).await;
    assert_eq!(first, second);
    assert_eq!(first, created);

    let (status, body) = send(&app.router, "GET", "/api/courses/unknown", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_delete_course_requires_owner_and_cascades() {
    let app = create_test_app();
    let alice = token_for("alice");
    let mallory = token_for("mallory");

    let (_, created) = send(
        &app.router,
        "POST",
        "/api/courses/generate",
        Some(alice.as_str()),
        Some(json!({ "topic": "Linear Algebra" })),
    )
    .await;
    let course_id = created["course"]["id"].as_str().unwrap();
    let uri = format!("/api/courses/{}", course_id);

    send(
        &app.router,
        "POST",
        &format!("{}/quiz/generate", uri),
        Some(alice.as_str()),
        None,
    )
    .await;

    let (status, _) = send(&app.router, "DELETE", &uri, Some(mallory.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.store.module_count().await, 3);
    assert_eq!(app.store.lesson_count().await, 6);

    let (status, body) = send(&app.router, "DELETE", &uri, Some(alice.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Course deleted successfully");
    assert_eq!(app.store.module_count().await, 0);
    assert_eq!(app.store.lesson_count().await, 0);
    assert_eq!(app.store.quiz_count().await, 0);

    let (status, _) = send(&app.router, "DELETE", &uri, Some(alice.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
