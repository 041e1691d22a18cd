use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;

use crate::error::AppResult;
use crate::extractors::AppJson;
use crate::middlewares::auth::AuthenticatedUser;
use crate::models::{PublicQuiz, Quiz, QuizResult, SubmitQuizRequest};
use crate::services::{AppState, QuizService};

/// POST /api/courses/{course_id}/quiz/generate
///
/// Responds with the public view even though the caller owns the course.
pub async fn generate_quiz(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(course_id): Path<String>,
) -> AppResult<(StatusCode, Json<PublicQuiz>)> {
    let quiz = QuizService::new(&state)
        .generate_quiz(&course_id, &user.id)
        .await?;
    Ok((StatusCode::CREATED, Json(quiz.into())))
}

/// GET /api/courses/{course_id}/quiz
pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> AppResult<Json<PublicQuiz>> {
    let quiz = QuizService::new(&state)
        .get_quiz_by_course(&course_id)
        .await?;
    Ok(Json(quiz))
}

/// POST /api/courses/{course_id}/quiz/submit
pub async fn submit_quiz(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(course_id): Path<String>,
    AppJson(payload): AppJson<SubmitQuizRequest>,
) -> AppResult<Json<QuizResult>> {
    let result = QuizService::new(&state)
        .submit_quiz(&course_id, &payload.answers, &user.id)
        .await?;
    Ok(Json(result))
}

/// GET /api/courses/{course_id}/quiz/review
pub async fn review_quiz(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> AppResult<Json<Quiz>> {
    let quiz = QuizService::new(&state)
        .get_quiz_with_answers(&course_id)
        .await?;
    Ok(Json(quiz))
}
