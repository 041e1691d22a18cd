use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CourseStore, StoreError, StoreResult};
use crate::models::{
    Course, CourseModule, Lesson, NewCourse, NewLesson, NewModule, NewQuiz, Quiz,
};

/// In-process store for local runs without MongoDB and for tests.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
}

#[derive(Default)]
struct MemoryData {
    seq: u64,
    // course id -> (insertion sequence, course)
    courses: HashMap<String, (u64, Course)>,
    modules: Vec<CourseModule>,
    lessons: Vec<Lesson>,
    // course id -> quiz
    quizzes: HashMap<String, Quiz>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn module_count(&self) -> usize {
        self.data.read().await.modules.len()
    }

    pub async fn lesson_count(&self) -> usize {
        self.data.read().await.lessons.len()
    }

    pub async fn quiz_count(&self) -> usize {
        self.data.read().await.quizzes.len()
    }
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[async_trait]
impl CourseStore for MemoryStore {
    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
        let mut data = self.data.write().await;
        data.seq += 1;
        let seq = data.seq;

        let stored = Course {
            id: new_id(),
            title: course.title,
            description: course.description,
            tags: course.tags,
            owner_id: course.owner_id,
            created_at: course.created_at,
        };
        data.courses.insert(stored.id.clone(), (seq, stored.clone()));
        Ok(stored)
    }

    async fn insert_modules(
        &self,
        course_id: &str,
        modules: Vec<NewModule>,
    ) -> StoreResult<Vec<CourseModule>> {
        let mut data = self.data.write().await;
        let stored: Vec<CourseModule> = modules
            .into_iter()
            .map(|m| CourseModule {
                id: new_id(),
                course_id: course_id.to_string(),
                title: m.title,
                order: m.order,
            })
            .collect();
        data.modules.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn insert_lessons(
        &self,
        module_id: &str,
        lessons: Vec<NewLesson>,
    ) -> StoreResult<Vec<Lesson>> {
        let mut data = self.data.write().await;
        let stored: Vec<Lesson> = lessons
            .into_iter()
            .map(|l| Lesson {
                id: new_id(),
                module_id: module_id.to_string(),
                title: l.title,
                order_no: l.order_no,
                content: l.content,
            })
            .collect();
        data.lessons.extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn find_course(&self, course_id: &str) -> StoreResult<Option<Course>> {
        let data = self.data.read().await;
        Ok(data.courses.get(course_id).map(|(_, c)| c.clone()))
    }

    async fn find_courses_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Course>> {
        let data = self.data.read().await;
        let mut owned: Vec<&(u64, Course)> = data
            .courses
            .values()
            .filter(|(_, c)| c.owner_id == owner_id)
            .collect();
        // Newest first; insertion order breaks timestamp ties.
        owned.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| seq_b.cmp(seq_a))
        });
        Ok(owned.into_iter().map(|(_, c)| c.clone()).collect())
    }

    async fn find_modules(&self, course_id: &str) -> StoreResult<Vec<CourseModule>> {
        let data = self.data.read().await;
        let mut modules: Vec<CourseModule> = data
            .modules
            .iter()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| m.order);
        Ok(modules)
    }

    async fn find_lessons(&self, module_ids: &[String]) -> StoreResult<Vec<Lesson>> {
        let data = self.data.read().await;
        let mut lessons: Vec<Lesson> = data
            .lessons
            .iter()
            .filter(|l| module_ids.contains(&l.module_id))
            .cloned()
            .collect();
        lessons.sort_by_key(|l| l.order_no);
        Ok(lessons)
    }

    async fn delete_lessons(&self, module_ids: &[String]) -> StoreResult<u64> {
        let mut data = self.data.write().await;
        let before = data.lessons.len();
        data.lessons.retain(|l| !module_ids.contains(&l.module_id));
        Ok((before - data.lessons.len()) as u64)
    }

    async fn delete_modules(&self, course_id: &str) -> StoreResult<u64> {
        let mut data = self.data.write().await;
        let before = data.modules.len();
        data.modules.retain(|m| m.course_id != course_id);
        Ok((before - data.modules.len()) as u64)
    }

    async fn delete_course(&self, course_id: &str) -> StoreResult<u64> {
        let mut data = self.data.write().await;
        Ok(data.courses.remove(course_id).map_or(0, |_| 1))
    }

    async fn insert_quiz(&self, quiz: NewQuiz) -> StoreResult<Quiz> {
        let mut data = self.data.write().await;
        if data.quizzes.contains_key(&quiz.course_id) {
            return Err(StoreError::Duplicate("quizzes"));
        }

        let stored = Quiz {
            id: new_id(),
            course_id: quiz.course_id,
            questions: quiz.questions,
            created_at: quiz.created_at,
        };
        data.quizzes
            .insert(stored.course_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_quiz(&self, course_id: &str) -> StoreResult<Option<Quiz>> {
        let data = self.data.read().await;
        Ok(data.quizzes.get(course_id).cloned())
    }

    async fn delete_quiz(&self, course_id: &str) -> StoreResult<u64> {
        let mut data = self.data.write().await;
        Ok(data.quizzes.remove(course_id).map_or(0, |_| 1))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
