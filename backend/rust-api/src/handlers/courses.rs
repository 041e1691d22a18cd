use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::error::AppResult;
use crate::extractors::AppJson;
use crate::middlewares::auth::AuthenticatedUser;
use crate::models::{Course, CourseDetails, GenerateCourseRequest, MessageResponse};
use crate::services::{AppState, CourseService};

/// POST /api/courses/generate
pub async fn generate_course(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    AppJson(payload): AppJson<GenerateCourseRequest>,
) -> AppResult<(StatusCode, Json<CourseDetails>)> {
    payload.validate()?;

    let details = CourseService::new(&state)
        .generate_course(&payload.topic, &user.id)
        .await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /api/courses
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<Course>>> {
    let courses = CourseService::new(&state)
        .get_courses_by_owner(&user.id)
        .await?;
    Ok(Json(courses))
}

/// GET /api/courses/{course_id}
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> AppResult<Json<CourseDetails>> {
    let details = CourseService::new(&state)
        .get_course_details(&course_id)
        .await?;
    Ok(Json(details))
}

/// DELETE /api/courses/{course_id}
pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(course_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    CourseService::new(&state)
        .delete_course(&course_id, &user.id)
        .await?;
    Ok(Json(MessageResponse {
        message: "Course deleted successfully".to_string(),
    }))
}
