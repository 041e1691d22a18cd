//! Content generator adapter.
//!
//! A [`ContentGenerator`] backend returns loosely-typed drafts; the adapter
//! functions [`generate_outline`] and [`generate_quiz`] run them through
//! structural validation so nothing malformed ever reaches the store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::track_generation;
use crate::models::{CourseDetails, Question};

pub mod llm;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use llm::LlmContentGenerator;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("content generator timed out")]
    Timeout,

    #[error("content generator unreachable: {0}")]
    Transport(String),

    #[error("content generator returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Output could not be parsed at all
    #[error("content generator returned unparseable output: {0}")]
    Malformed(String),

    /// Output parsed but failed structural validation
    #[error("content generator returned invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

impl GenerationError {
    pub fn invalid(kind: &'static str, reason: impl Into<String>) -> Self {
        GenerationError::Invalid {
            kind,
            reason: reason.into(),
        }
    }
}

// Raw generator output. Every field is optional so that validation, not
// deserialization, decides what is acceptable.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOutline {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub modules: Option<Vec<RawModule>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawModule {
    pub title: Option<String>,
    pub order: Option<i64>,
    pub lessons: Option<Vec<RawLesson>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLesson {
    pub title: Option<String>,
    #[serde(rename = "orderNo", alias = "order_no", alias = "order")]
    pub order_no: Option<i64>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawQuiz {
    pub questions: Option<Vec<RawQuestion>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawQuestion {
    pub question: Option<String>,
    pub options: Option<Vec<String>>,
    #[serde(rename = "correctOptionIndex", alias = "correct_option_index")]
    pub correct_option_index: Option<i64>,
}

// Validated output.

#[derive(Debug, Clone, PartialEq)]
pub struct CourseOutline {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub modules: Vec<ModuleOutline>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOutline {
    pub title: String,
    pub order: u32,
    pub lessons: Vec<LessonOutline>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LessonOutline {
    pub title: String,
    pub order_no: u32,
    pub content: String,
}

impl CourseOutline {
    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizDraft {
    pub questions: Vec<Question>,
}

/// Course material handed to the generator for quiz generation, in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseContent {
    pub title: String,
    pub description: String,
    pub modules: Vec<ModuleContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleContent {
    pub title: String,
    pub lessons: Vec<LessonContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LessonContent {
    pub title: String,
    pub content: String,
}

impl From<&CourseDetails> for CourseContent {
    fn from(details: &CourseDetails) -> Self {
        CourseContent {
            title: details.course.title.clone(),
            description: details.course.description.clone(),
            modules: details
                .modules
                .iter()
                .map(|m| ModuleContent {
                    title: m.module.title.clone(),
                    lessons: m
                        .lessons
                        .iter()
                        .map(|l| LessonContent {
                            title: l.title.clone(),
                            content: l.content.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl CourseContent {
    /// Plain-text rendering, truncated to `max_chars` characters.
    pub fn render(&self, max_chars: usize) -> String {
        let mut text = format!("Course: {}\n", self.title);
        if !self.description.is_empty() {
            text.push_str(&format!("Description: {}\n", self.description));
        }
        for (m_idx, module) in self.modules.iter().enumerate() {
            text.push_str(&format!("\nModule {}: {}\n", m_idx + 1, module.title));
            for (l_idx, lesson) in module.lessons.iter().enumerate() {
                text.push_str(&format!(
                    "\nLesson {}.{}: {}\n{}\n",
                    m_idx + 1,
                    l_idx + 1,
                    lesson.title,
                    lesson.content
                ));
            }
        }

        if text.chars().count() > max_chars {
            text = text.chars().take(max_chars).collect();
        }
        text
    }
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn outline(&self, topic: &str) -> Result<RawOutline, GenerationError>;

    async fn quiz(&self, content: &CourseContent) -> Result<RawQuiz, GenerationError>;
}

pub async fn generate_outline(
    generator: &dyn ContentGenerator,
    topic: &str,
) -> Result<CourseOutline, GenerationError> {
    let raw = track_generation("outline", generator.outline(topic)).await?;
    validate::validate_outline(raw).inspect_err(|e| {
        tracing::warn!("Rejected generated outline for topic '{}': {}", topic, e);
    })
}

pub async fn generate_quiz(
    generator: &dyn ContentGenerator,
    content: &CourseContent,
) -> Result<QuizDraft, GenerationError> {
    let raw = track_generation("quiz", generator.quiz(content)).await?;
    validate::validate_quiz(raw).inspect_err(|e| {
        tracing::warn!("Rejected generated quiz for course '{}': {}", content.title, e);
    })
}
