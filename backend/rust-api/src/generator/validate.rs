use super::{
    CourseOutline, GenerationError, LessonOutline, ModuleOutline, QuizDraft, RawOutline, RawQuiz,
};
use crate::models::Question;

const OUTLINE: &str = "outline";
const QUIZ: &str = "quiz";

pub const MIN_OPTIONS: usize = 2;

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolves sibling positions. Explicit values must be exactly `1..=n` in any
/// order; if every value is missing, positions follow appearance order.
fn resolve_orders(values: &[Option<i64>], what: &str) -> Result<Vec<u32>, String> {
    let explicit: Vec<i64> = values.iter().flatten().copied().collect();

    if explicit.is_empty() {
        return Ok((1..=values.len() as u32).collect());
    }
    if explicit.len() != values.len() {
        return Err(format!("some {} entries are missing an order", what));
    }

    let mut sorted = explicit.clone();
    sorted.sort_unstable();
    let contiguous = sorted
        .iter()
        .enumerate()
        .all(|(idx, value)| *value == idx as i64 + 1);
    if !contiguous {
        return Err(format!(
            "{} orders must run 1..={} without gaps or repeats, got {:?}",
            what,
            values.len(),
            explicit
        ));
    }

    Ok(explicit.into_iter().map(|v| v as u32).collect())
}

fn normalize_tags(tags: Option<Vec<String>>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.unwrap_or_default()
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

pub fn validate_outline(raw: RawOutline) -> Result<CourseOutline, GenerationError> {
    let title =
        non_empty(raw.title).ok_or_else(|| GenerationError::invalid(OUTLINE, "missing course title"))?;

    let raw_modules = raw.modules.unwrap_or_default();
    if raw_modules.is_empty() {
        return Err(GenerationError::invalid(OUTLINE, "course has no modules"));
    }

    let module_orders = resolve_orders(
        &raw_modules.iter().map(|m| m.order).collect::<Vec<_>>(),
        "module",
    )
    .map_err(|reason| GenerationError::invalid(OUTLINE, reason))?;

    let mut modules = Vec::with_capacity(raw_modules.len());
    for (raw_module, order) in raw_modules.into_iter().zip(module_orders) {
        let module_title = non_empty(raw_module.title).ok_or_else(|| {
            GenerationError::invalid(OUTLINE, format!("module {} has no title", order))
        })?;

        let raw_lessons = raw_module.lessons.unwrap_or_default();
        if raw_lessons.is_empty() {
            return Err(GenerationError::invalid(
                OUTLINE,
                format!("module '{}' has no lessons", module_title),
            ));
        }

        let lesson_orders = resolve_orders(
            &raw_lessons.iter().map(|l| l.order_no).collect::<Vec<_>>(),
            "lesson",
        )
        .map_err(|reason| {
            GenerationError::invalid(OUTLINE, format!("module '{}': {}", module_title, reason))
        })?;

        let mut lessons = Vec::with_capacity(raw_lessons.len());
        for (raw_lesson, order_no) in raw_lessons.into_iter().zip(lesson_orders) {
            let lesson_title = non_empty(raw_lesson.title).ok_or_else(|| {
                GenerationError::invalid(
                    OUTLINE,
                    format!("lesson {} of module '{}' has no title", order_no, module_title),
                )
            })?;
            let content = non_empty(raw_lesson.content).ok_or_else(|| {
                GenerationError::invalid(
                    OUTLINE,
                    format!("lesson '{}' has no content", lesson_title),
                )
            })?;
            lessons.push(LessonOutline {
                title: lesson_title,
                order_no,
                content,
            });
        }
        lessons.sort_by_key(|l| l.order_no);

        modules.push(ModuleOutline {
            title: module_title,
            order,
            lessons,
        });
    }
    modules.sort_by_key(|m| m.order);

    Ok(CourseOutline {
        title,
        description: raw
            .description
            .map(|d| d.trim().to_string())
            .unwrap_or_default(),
        tags: normalize_tags(raw.tags),
        modules,
    })
}

pub fn validate_quiz(raw: RawQuiz) -> Result<QuizDraft, GenerationError> {
    let raw_questions = raw.questions.unwrap_or_default();
    if raw_questions.is_empty() {
        return Err(GenerationError::invalid(QUIZ, "quiz has no questions"));
    }

    let mut questions = Vec::with_capacity(raw_questions.len());
    for (idx, raw_question) in raw_questions.into_iter().enumerate() {
        let number = idx + 1;
        let question = non_empty(raw_question.question).ok_or_else(|| {
            GenerationError::invalid(QUIZ, format!("question {} has no text", number))
        })?;

        let options: Vec<String> = raw_question
            .options
            .unwrap_or_default()
            .into_iter()
            .map(|o| o.trim().to_string())
            .collect();
        if options.len() < MIN_OPTIONS {
            return Err(GenerationError::invalid(
                QUIZ,
                format!("question {} has fewer than {} options", number, MIN_OPTIONS),
            ));
        }
        if options.iter().any(|o| o.is_empty()) {
            return Err(GenerationError::invalid(
                QUIZ,
                format!("question {} has an empty option", number),
            ));
        }

        let correct = raw_question.correct_option_index.ok_or_else(|| {
            GenerationError::invalid(QUIZ, format!("question {} has no correct option", number))
        })?;
        if correct < 0 || correct as usize >= options.len() {
            return Err(GenerationError::invalid(
                QUIZ,
                format!(
                    "question {} correct option {} is outside 0..{}",
                    number,
                    correct,
                    options.len()
                ),
            ));
        }

        questions.push(Question {
            question,
            options,
            correct_option_index: correct as u32,
        });
    }

    Ok(QuizDraft { questions })
}
