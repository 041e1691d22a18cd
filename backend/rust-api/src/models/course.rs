use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Minimum topic length, counted in characters after trimming.
pub const MIN_TOPIC_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Owner identifier (the verified `sub` of whoever generated the course)
    #[serde(rename = "createdBy")]
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub order_no: u32,
    pub content: String,
}

/// Module with its lessons attached, as served by the details view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleWithLessons {
    #[serde(flatten)]
    pub module: CourseModule,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseDetails {
    pub course: Course,
    pub modules: Vec<ModuleWithLessons>,
}

impl CourseDetails {
    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }

    pub fn has_content(&self) -> bool {
        self.lesson_count() > 0
    }
}

// Write-side payloads: the store assigns identifiers.

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewModule {
    pub title: String,
    pub order: u32,
}

#[derive(Debug, Clone)]
pub struct NewLesson {
    pub title: String,
    pub order_no: u32,
    pub content: String,
}

/// Request body for POST /api/courses/generate
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateCourseRequest {
    #[validate(custom(function = "validate_topic"))]
    pub topic: String,
}

pub fn validate_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.trim().chars().count() < MIN_TOPIC_CHARS {
        return Err(ValidationError::new("topic_too_short")
            .with_message("Topic is required and must be at least 3 characters".into()));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
