use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{
    ContentGenerator, CourseContent, GenerationError, RawLesson, RawModule, RawOutline,
    RawQuestion, RawQuiz,
};

/// Correct option indices of [`sample_quiz`].
pub(crate) const SAMPLE_ANSWERS: [u32; 3] = [1, 0, 2];

pub(crate) fn sample_outline() -> RawOutline {
    let module = |title: &str, order: i64, lessons: &[&str]| RawModule {
        title: Some(title.to_string()),
        order: Some(order),
        lessons: Some(
            lessons
                .iter()
                .enumerate()
                .map(|(idx, lesson)| RawLesson {
                    title: Some(lesson.to_string()),
                    order_no: Some(idx as i64 + 1),
                    content: Some(format!("All about {}", lesson)),
                })
                .collect(),
        ),
    };

    RawOutline {
        title: Some("Linear Algebra Essentials".to_string()),
        description: Some("Vectors, matrices and transformations".to_string()),
        tags: Some(vec!["math".to_string(), "algebra".to_string()]),
        // Deliberately out of order: the adapter sorts.
        modules: Some(vec![
            module("Matrices", 2, &["Matrix product", "Determinants"]),
            module("Vectors", 1, &["Vector spaces", "Dot product", "Norms"]),
        ]),
    }
}

pub(crate) fn sample_quiz() -> RawQuiz {
    let question = |text: &str, correct: u32| RawQuestion {
        question: Some(text.to_string()),
        options: Some(vec!["a".into(), "b".into(), "c".into()]),
        correct_option_index: Some(correct as i64),
    };
    RawQuiz {
        questions: Some(vec![
            question("What is a vector?", SAMPLE_ANSWERS[0]),
            question("What is a matrix?", SAMPLE_ANSWERS[1]),
            question("What is a determinant?", SAMPLE_ANSWERS[2]),
        ]),
    }
}

/// Generator returning fixed drafts; `None` makes the call fail upstream.
pub(crate) struct ScriptedGenerator {
    pub outline: Option<RawOutline>,
    pub quiz: Option<RawQuiz>,
    pub outline_calls: AtomicUsize,
    pub quiz_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            outline: Some(sample_outline()),
            quiz: Some(sample_quiz()),
            outline_calls: AtomicUsize::new(0),
            quiz_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_outline(outline: Option<RawOutline>) -> Self {
        Self {
            outline,
            ..Self::new()
        }
    }

    pub fn with_quiz(quiz: Option<RawQuiz>) -> Self {
        Self {
            quiz,
            ..Self::new()
        }
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn outline(&self, _topic: &str) -> Result<RawOutline, GenerationError> {
        self.outline_calls.fetch_add(1, Ordering::SeqCst);
        self.outline.clone().ok_or(GenerationError::Upstream {
            status: 503,
            message: "scripted failure".to_string(),
        })
    }

    async fn quiz(&self, _content: &CourseContent) -> Result<RawQuiz, GenerationError> {
        self.quiz_calls.fetch_add(1, Ordering::SeqCst);
        self.quiz.clone().ok_or(GenerationError::Timeout)
    }
}
