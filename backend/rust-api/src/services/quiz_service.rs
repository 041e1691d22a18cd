use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::generator::{generate_quiz, ContentGenerator, CourseContent};
use crate::metrics::{QUIZZES_GENERATED_TOTAL, QUIZ_SCORE_PERCENTAGE, QUIZ_SUBMISSIONS_TOTAL};
use crate::models::{NewQuiz, PublicQuiz, Question, Quiz, QuizResult};
use crate::services::{AppState, CourseService};
use crate::store::{CourseStore, StoreError};

const QUIZ_NOT_FOUND: &str = "Quiz not found for this course";

/// Quiz lifecycle: one generated quiz per course, graded independently on
/// every submission.
pub struct QuizService {
    store: Arc<dyn CourseStore>,
    generator: Arc<dyn ContentGenerator>,
    courses: CourseService,
}

impl QuizService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            generator: state.generator.clone(),
            courses: CourseService::new(state),
        }
    }

    pub async fn generate_quiz(&self, course_id: &str, requester_id: &str) -> AppResult<Quiz> {
        let details = self.courses.find_course_details(course_id).await?;

        if details.course.owner_id != requester_id {
            return Err(AppError::forbidden(
                "Only the course owner can generate its quiz",
            ));
        }

        if self.store.find_quiz(&details.course.id).await?.is_some() {
            return Err(already_exists());
        }

        if details.modules.is_empty() || !details.has_content() {
            return Err(AppError::validation(
                "Course has no content to generate a quiz from",
            ));
        }

        let content = CourseContent::from(&details);
        let draft = generate_quiz(self.generator.as_ref(), &content)
            .await
            .inspect_err(|_| {
                QUIZZES_GENERATED_TOTAL.with_label_values(&["failed"]).inc();
            })?;

        let quiz = self
            .store
            .insert_quiz(NewQuiz {
                course_id: details.course.id.clone(),
                questions: draft.questions,
                created_at: Utc::now(),
            })
            .await
            .map_err(quiz_insert_error)?;

        // The course may have been deleted while the generator was running.
        if self.store.find_course(&quiz.course_id).await?.is_none() {
            tracing::warn!(
                course_id = %quiz.course_id,
                "Course deleted during quiz generation, discarding quiz"
            );
            if let Err(e) = self.store.delete_quiz(&quiz.course_id).await {
                tracing::warn!(course_id = %quiz.course_id, "Failed to discard quiz: {}", e);
            }
            QUIZZES_GENERATED_TOTAL.with_label_values(&["discarded"]).inc();
            return Err(AppError::not_found("Course not found"));
        }

        QUIZZES_GENERATED_TOTAL.with_label_values(&["success"]).inc();
        tracing::info!(
            course_id = %quiz.course_id,
            quiz_id = %quiz.id,
            questions = quiz.questions.len(),
            "Quiz generated"
        );
        Ok(quiz)
    }

    /// Public view: correct answers are stripped.
    pub async fn get_quiz_by_course(&self, course_id: &str) -> AppResult<PublicQuiz> {
        Ok(self.load_quiz(course_id).await?.into())
    }

    /// Review view with correct answers.
    pub async fn get_quiz_with_answers(&self, course_id: &str) -> AppResult<Quiz> {
        self.load_quiz(course_id).await
    }

    pub async fn submit_quiz(
        &self,
        course_id: &str,
        answers: &Value,
        learner_id: &str,
    ) -> AppResult<QuizResult> {
        let quiz = self.load_quiz(course_id).await?;

        let graded = parse_answers(answers).and_then(|answers| grade(&quiz.questions, &answers));
        let result = match graded {
            Ok(result) => result,
            Err(e) => {
                QUIZ_SUBMISSIONS_TOTAL.with_label_values(&["rejected"]).inc();
                return Err(e);
            }
        };

        QUIZ_SUBMISSIONS_TOTAL.with_label_values(&["graded"]).inc();
        QUIZ_SCORE_PERCENTAGE.observe(result.score_percentage as f64);
        tracing::info!(
            course_id,
            learner_id,
            correct = result.correct_answers,
            total = result.total_questions,
            score = result.score_percentage,
            "Quiz submitted"
        );
        Ok(result)
    }

    async fn load_quiz(&self, course_id: &str) -> AppResult<Quiz> {
        self.store
            .find_quiz(course_id)
            .await?
            .ok_or_else(|| AppError::not_found(QUIZ_NOT_FOUND))
    }
}

fn already_exists() -> AppError {
    AppError::conflict("A quiz already exists for this course")
}

/// The unique index on the course reference is the authority for the
/// one-quiz-per-course rule; a concurrent generator that loses the race lands here.
fn quiz_insert_error(err: StoreError) -> AppError {
    match err {
        StoreError::Duplicate(_) => already_exists(),
        other => other.into(),
    }
}

/// Answers must be a JSON array whose entries are `null` (unanswered) or
/// non-negative integers.
pub fn parse_answers(answers: &Value) -> AppResult<Vec<Option<u32>>> {
    let entries = answers
        .as_array()
        .ok_or_else(|| AppError::validation("Answers must be an array"))?;

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| match entry {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| invalid_answer(idx)),
            _ => Err(invalid_answer(idx)),
        })
        .collect()
}

fn invalid_answer(idx: usize) -> AppError {
    AppError::validation(format!(
        "Answer {} must be null or a non-negative integer",
        idx + 1
    ))
}

/// Positional grading; an unanswered entry is never correct.
/// The percentage is rounded half up.
pub fn grade(questions: &[Question], answers: &[Option<u32>]) -> AppResult<QuizResult> {
    if answers.len() != questions.len() {
        return Err(AppError::validation(format!(
            "Expected {} answers, got {}",
            questions.len(),
            answers.len()
        )));
    }

    let total = questions.len() as u32;
    let correct = questions
        .iter()
        .zip(answers)
        .filter(|(q, a)| **a == Some(q.correct_option_index))
        .count() as u32;
    let score = if total == 0 {
        0
    } else {
        (correct * 100 + total / 2) / total
    };

    Ok(QuizResult {
        correct_answers: correct,
        total_questions: total,
        score_percentage: score,
    })
}
