use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub correct_option_index: u32,
}

/// Stored quiz. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub course_id: String,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub course_id: String,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

/// Question as shown before submission: the correct index does not exist on this type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicQuestion {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuiz {
    pub id: String,
    pub course_id: String,
    pub questions: Vec<PublicQuestion>,
    pub created_at: DateTime<Utc>,
}

impl From<Quiz> for PublicQuiz {
    fn from(quiz: Quiz) -> Self {
        PublicQuiz {
            id: quiz.id,
            course_id: quiz.course_id,
            questions: quiz
                .questions
                .into_iter()
                .map(|q| PublicQuestion {
                    question: q.question,
                    options: q.options,
                })
                .collect(),
            created_at: quiz.created_at,
        }
    }
}

/// Request body for POST /api/courses/{id}/quiz/submit.
///
/// `answers` is kept as raw JSON so a non-array payload is reported as a
/// validation failure instead of a deserialization error.
#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    #[serde(default)]
    pub answers: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub correct_answers: u32,
    pub total_questions: u32,
    pub score_percentage: u32,
}
