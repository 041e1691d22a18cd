//! Hierarchical course store: courses own modules, modules own lessons,
//! and a course owns at most one quiz.
//!
//! Identifiers are opaque strings. A lookup with an identifier the backend
//! cannot parse behaves like a lookup of a missing entity.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Course, CourseModule, Lesson, NewCourse, NewLesson, NewModule, NewQuiz, Quiz,
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("duplicate key in collection {0}")]
    Duplicate(&'static str),

    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course>;

    /// Inserts the modules of one course, returning them in input order.
    async fn insert_modules(
        &self,
        course_id: &str,
        modules: Vec<NewModule>,
    ) -> StoreResult<Vec<CourseModule>>;

    /// Inserts the lessons of one module, returning them in input order.
    async fn insert_lessons(
        &self,
        module_id: &str,
        lessons: Vec<NewLesson>,
    ) -> StoreResult<Vec<Lesson>>;

    async fn find_course(&self, course_id: &str) -> StoreResult<Option<Course>>;

    /// Courses created by `owner_id`, newest first.
    async fn find_courses_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Course>>;

    /// Modules of a course sorted by `order`.
    async fn find_modules(&self, course_id: &str) -> StoreResult<Vec<CourseModule>>;

    /// Lessons of the given modules sorted by `order_no`.
    async fn find_lessons(&self, module_ids: &[String]) -> StoreResult<Vec<Lesson>>;

    async fn delete_lessons(&self, module_ids: &[String]) -> StoreResult<u64>;

    async fn delete_modules(&self, course_id: &str) -> StoreResult<u64>;

    async fn delete_course(&self, course_id: &str) -> StoreResult<u64>;

    /// Fails with [`StoreError::Duplicate`] when the course already has a quiz.
    async fn insert_quiz(&self, quiz: NewQuiz) -> StoreResult<Quiz>;

    async fn find_quiz(&self, course_id: &str) -> StoreResult<Option<Quiz>>;

    async fn delete_quiz(&self, course_id: &str) -> StoreResult<u64>;

    async fn ping(&self) -> StoreResult<()>;
}
