#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use coursegen_api::{
    config::Config,
    create_router,
    generator::{
        ContentGenerator, CourseContent, GenerationError, RawLesson, RawModule, RawOutline,
        RawQuestion, RawQuiz,
    },
    middlewares::auth::{AuthClaims, JwtService},
    services::{AppState, CourseCache},
    store::{CourseStore, MemoryStore},
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Correct option indices of the quiz served by [`FakeGenerator`].
pub const QUIZ_ANSWERS: [u32; 4] = [2, 0, 1, 3];

/// Deterministic generator: the outline is derived from the topic.
pub struct FakeGenerator {
    pub fail_outline: bool,
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn outline(&self, topic: &str) -> Result<RawOutline, GenerationError> {
        if self.fail_outline {
            return Err(GenerationError::Upstream {
                status: 502,
                message: "model overloaded".to_string(),
            });
        }

        let module = |title: &str, order: i64, lessons: usize| RawModule {
            title: Some(title.to_string()),
            order: Some(order),
            lessons: Some(
                (1..=lessons)
                    .rev()
                    .map(|n| RawLesson {
                        title: Some(format!("{} lesson {}", title, n)),
                        order_no: Some(n as i64),
                        content: Some(format!("Content of {} lesson {}", title, n)),
                    })
                    .collect(),
            ),
        };

        Ok(RawOutline {
            title: Some(format!("{} Course", topic)),
            description: Some(format!("An introduction to {}", topic)),
            tags: Some(vec![topic.to_lowercase()]),
            modules: Some(vec![
                module("Applications", 3, 1),
                module("Foundations", 1, 3),
                module("Techniques", 2, 2),
            ]),
        })
    }

    async fn quiz(&self, content: &CourseContent) -> Result<RawQuiz, GenerationError> {
        Ok(RawQuiz {
            questions: Some(
                QUIZ_ANSWERS
                    .iter()
                    .enumerate()
                    .map(|(idx, correct)| RawQuestion {
                        question: Some(format!("Question {} about {}", idx + 1, content.title)),
                        options: Some(vec![
                            "first".to_string(),
                            "second".to_string(),
                            "third".to_string(),
                            "fourth".to_string(),
                        ]),
                        correct_option_index: Some(*correct as i64),
                    })
                    .collect(),
            ),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config
}

pub fn create_test_app_with(config: Config, generator: FakeGenerator) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn CourseStore> = store.clone();
    let state = AppState::with_components(
        config,
        shared,
        Arc::new(generator),
        CourseCache::disabled(),
    );

    TestApp {
        router: create_router(Arc::new(state)),
        store,
    }
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(test_config(), FakeGenerator { fail_outline: false })
}

pub fn token_for(user_id: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    JwtService::new(TEST_SECRET)
        .generate_token(AuthClaims {
            sub: user_id.to_string(),
            exp: (now + 3600) as usize,
            iat: now as usize,
            aud: None,
            iss: None,
        })
        .expect("token should encode")
}

/// Sends a request and returns the status with the parsed JSON body
/// (`Value::Null` for an empty or non-JSON body).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
