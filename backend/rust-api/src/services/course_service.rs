use chrono::Utc;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::generator::{generate_outline, ContentGenerator, CourseOutline};
use crate::metrics::COURSES_TOTAL;
use crate::models::course::validate_topic;
use crate::models::{
    Course, CourseDetails, CourseModule, Lesson, ModuleWithLessons, NewCourse, NewLesson,
    NewModule,
};
use crate::services::{AppState, CourseCache};
use crate::store::{CourseStore, StoreError};

/// Course assembly: outline generation, hierarchy persistence, reads and
/// owner-checked cascade deletion.
pub struct CourseService {
    store: Arc<dyn CourseStore>,
    generator: Arc<dyn ContentGenerator>,
    cache: CourseCache,
}

impl CourseService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            generator: state.generator.clone(),
            cache: state.cache.clone(),
        }
    }

    /// Generates an outline for `topic`, persists course, modules and lessons
    /// in that order and returns the hierarchy as re-read from the store.
    pub async fn generate_course(&self, topic: &str, owner_id: &str) -> AppResult<CourseDetails> {
        validate_topic(topic).map_err(|e| {
            AppError::validation(
                e.message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            )
        })?;
        let topic = topic.trim();

        let outline = generate_outline(self.generator.as_ref(), topic)
            .await
            .inspect_err(|_| {
                COURSES_TOTAL
                    .with_label_values(&["generation_failed"])
                    .inc();
            })?;

        let course = self
            .store
            .insert_course(NewCourse {
                title: outline.title.clone(),
                description: outline.description.clone(),
                tags: outline.tags.clone(),
                owner_id: owner_id.to_string(),
                created_at: Utc::now(),
            })
            .await?;

        let assembled = match self.persist_hierarchy(&course.id, &outline).await {
            Ok(()) => self.verify_hierarchy(&course, &outline).await,
            Err(e) => Err(e),
        };

        match assembled {
            Ok(details) => {
                COURSES_TOTAL.with_label_values(&["generated"]).inc();
                tracing::info!(
                    course_id = %course.id,
                    owner_id,
                    modules = details.modules.len(),
                    lessons = details.lesson_count(),
                    "Course generated for topic '{}'",
                    topic
                );
                Ok(details)
            }
            Err(e) => {
                COURSES_TOTAL.with_label_values(&["persist_failed"]).inc();
                tracing::warn!(course_id = %course.id, "Course assembly failed, cleaning up: {}", e);
                self.remove_hierarchy(&course.id).await;
                Err(e.into())
            }
        }
    }

    async fn persist_hierarchy(
        &self,
        course_id: &str,
        outline: &CourseOutline,
    ) -> Result<(), StoreError> {
        let modules = self
            .store
            .insert_modules(
                course_id,
                outline
                    .modules
                    .iter()
                    .map(|m| NewModule {
                        title: m.title.clone(),
                        order: m.order,
                    })
                    .collect(),
            )
            .await?;

        if modules.len() != outline.modules.len() {
            return Err(StoreError::Backend(format!(
                "stored {} of {} modules",
                modules.len(),
                outline.modules.len()
            )));
        }

        for (stored, planned) in modules.iter().zip(&outline.modules) {
            self.store
                .insert_lessons(
                    &stored.id,
                    planned
                        .lessons
                        .iter()
                        .map(|l| NewLesson {
                            title: l.title.clone(),
                            order_no: l.order_no,
                            content: l.content.clone(),
                        })
                        .collect(),
                )
                .await?;
        }

        Ok(())
    }

    /// Re-reads the stored hierarchy and checks it against the outline it was built from.
    async fn verify_hierarchy(
        &self,
        course: &Course,
        outline: &CourseOutline,
    ) -> Result<CourseDetails, StoreError> {
        let details = self.load_details(course.clone()).await?;

        if details.modules.len() != outline.modules.len()
            || details.lesson_count() != outline.lesson_count()
        {
            return Err(StoreError::Backend(format!(
                "re-read found {} modules / {} lessons, expected {} / {}",
                details.modules.len(),
                details.lesson_count(),
                outline.modules.len(),
                outline.lesson_count()
            )));
        }

        Ok(details)
    }

    /// Best-effort removal of a partially written hierarchy, children first.
    async fn remove_hierarchy(&self, course_id: &str) {
        let module_ids = match self.store.find_modules(course_id).await {
            Ok(modules) => modules.into_iter().map(|m| m.id).collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(course_id, "Cleanup could not list modules: {}", e);
                Vec::new()
            }
        };

        if !module_ids.is_empty() {
            if let Err(e) = self.store.delete_lessons(&module_ids).await {
                tracing::warn!(course_id, "Cleanup failed to delete lessons: {}", e);
            }
        }
        if let Err(e) = self.store.delete_modules(course_id).await {
            tracing::warn!(course_id, "Cleanup failed to delete modules: {}", e);
        }
        if let Err(e) = self.store.delete_course(course_id).await {
            tracing::warn!(course_id, "Cleanup failed to delete course: {}", e);
        }
    }

    pub async fn get_courses_by_owner(&self, owner_id: &str) -> AppResult<Vec<Course>> {
        Ok(self.store.find_courses_by_owner(owner_id).await?)
    }

    pub async fn get_course_details(&self, course_id: &str) -> AppResult<CourseDetails> {
        if let Some(details) = self.cache.get_details(course_id).await {
            return Ok(details);
        }

        let details = self.find_course_details(course_id).await?;
        self.cache.put_details(&details).await;
        Ok(details)
    }

    /// Reads the hierarchy straight from the store, bypassing the cache.
    /// Writers that depend on the course still existing go through here.
    pub async fn find_course_details(&self, course_id: &str) -> AppResult<CourseDetails> {
        let course = self
            .store
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::not_found("Course not found"))?;

        Ok(self.load_details(course).await?)
    }

    async fn load_details(&self, course: Course) -> Result<CourseDetails, StoreError> {
        let modules = self.store.find_modules(&course.id).await?;
        let module_ids: Vec<String> = modules.iter().map(|m| m.id.clone()).collect();
        let lessons = if module_ids.is_empty() {
            Vec::new()
        } else {
            self.store.find_lessons(&module_ids).await?
        };

        Ok(CourseDetails {
            course,
            modules: attach_lessons(modules, lessons),
        })
    }

    pub async fn delete_course(&self, course_id: &str, requester_id: &str) -> AppResult<()> {
        let course = self
            .store
            .find_course(course_id)
            .await?
            .ok_or_else(|| AppError::not_found("Course not found"))?;

        if course.owner_id != requester_id {
            tracing::warn!(
                course_id,
                requester_id,
                "Rejected course deletion by non-owner"
            );
            return Err(AppError::forbidden(
                "You are not allowed to delete this course",
            ));
        }

        let module_ids: Vec<String> = self
            .store
            .find_modules(&course.id)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        let lessons = if module_ids.is_empty() {
            0
        } else {
            self.store.delete_lessons(&module_ids).await?
        };
        let modules = self.store.delete_modules(&course.id).await?;
        let mut quizzes = self.store.delete_quiz(&course.id).await?;
        self.store.delete_course(&course.id).await?;
        // A quiz generated while the cascade ran may have landed after the
        // first sweep.
        quizzes += self.store.delete_quiz(&course.id).await?;
        self.cache.invalidate_details(&course.id).await;

        COURSES_TOTAL.with_label_values(&["deleted"]).inc();
        tracing::info!(
            course_id,
            lessons,
            modules,
            quizzes,
            "Course deleted"
        );
        Ok(())
    }
}

/// Groups lessons under their modules, keeping module order and the
/// `order_no` order of each module's lessons.
fn attach_lessons(modules: Vec<CourseModule>, lessons: Vec<Lesson>) -> Vec<ModuleWithLessons> {
    let mut grouped: Vec<ModuleWithLessons> = modules
        .into_iter()
        .map(|module| ModuleWithLessons {
            module,
            lessons: Vec::new(),
        })
        .collect();

    for lesson in lessons {
        if let Some(entry) = grouped.iter_mut().find(|m| m.module.id == lesson.module_id) {
            entry.lessons.push(lesson);
        }
    }
    for entry in &mut grouped {
        entry.lessons.sort_by_key(|l| l.order_no);
    }
    grouped
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::generator::testing::{sample_outline, ScriptedGenerator};
    use crate::generator::RawOutline;
    use crate::models::{NewQuiz, Quiz};
    use crate::store::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn state(store: Arc<dyn CourseStore>, generator: Arc<ScriptedGenerator>) -> AppState {
        AppState::with_components(Config::default(), store, generator, CourseCache::disabled())
    }

    /// Memory store whose `insert_lessons` fails from the n-th call on.
    struct FailingLessonsStore {
        inner: Arc<MemoryStore>,
        fail_from_call: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CourseStore for FailingLessonsStore {
        async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
            self.inner.insert_course(course).await
        }
        async fn insert_modules(
            &self,
            course_id: &str,
            modules: Vec<NewModule>,
        ) -> StoreResult<Vec<CourseModule>> {
            self.inner.insert_modules(course_id, modules).await
        }
        async fn insert_lessons(
            &self,
            module_id: &str,
            lessons: Vec<NewLesson>,
        ) -> StoreResult<Vec<Lesson>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.fail_from_call {
                return Err(StoreError::Backend("write concern timeout".to_string()));
            }
            self.inner.insert_lessons(module_id, lessons).await
        }
        async fn find_course(&self, course_id: &str) -> StoreResult<Option<Course>> {
            self.inner.find_course(course_id).await
        }
        async fn find_courses_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Course>> {
            self.inner.find_courses_by_owner(owner_id).await
        }
        async fn find_modules(&self, course_id: &str) -> StoreResult<Vec<CourseModule>> {
            self.inner.find_modules(course_id).await
        }
        async fn find_lessons(&self, module_ids: &[String]) -> StoreResult<Vec<Lesson>> {
            self.inner.find_lessons(module_ids).await
        }
        async fn delete_lessons(&self, module_ids: &[String]) -> StoreResult<u64> {
            self.inner.delete_lessons(module_ids).await
        }
        async fn delete_modules(&self, course_id: &str) -> StoreResult<u64> {
            self.inner.delete_modules(course_id).await
        }
        async fn delete_course(&self, course_id: &str) -> StoreResult<u64> {
            self.inner.delete_course(course_id).await
        }
        async fn insert_quiz(&self, quiz: NewQuiz) -> StoreResult<Quiz> {
            self.inner.insert_quiz(quiz).await
        }
        async fn find_quiz(&self, course_id: &str) -> StoreResult<Option<Quiz>> {
            self.inner.find_quiz(course_id).await
        }
        async fn delete_quiz(&self, course_id: &str) -> StoreResult<u64> {
            self.inner.delete_quiz(course_id).await
        }
        async fn ping(&self) -> StoreResult<()> {
            self.inner.ping().await
        }
    }

    #[tokio::test]
    async fn generated_course_is_sorted_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        let service = CourseService::new(&state(store.clone(), Arc::new(ScriptedGenerator::new())));

        let details = service
            .generate_course("  Linear Algebra  ", "owner-1")
            .await
            .unwrap();

        assert_eq!(details.course.title, "Linear Algebra Essentials");
        assert_eq!(details.course.owner_id, "owner-1");
        let orders: Vec<u32> = details.modules.iter().map(|m| m.module.order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(details.modules[0].module.title, "Vectors");
        for module in &details.modules {
            let lesson_orders: Vec<u32> = module.lessons.iter().map(|l| l.order_no).collect();
            let expected: Vec<u32> = (1..=module.lessons.len() as u32).collect();
            assert_eq!(lesson_orders, expected);
        }

        assert_eq!(store.module_count().await, 2);
        assert_eq!(store.lesson_count().await, 5);
    }

    #[tokio::test]
    async fn short_topic_is_rejected_before_generation() {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::new());
        let service = CourseService::new(&state(store.clone(), generator.clone()));

        for topic in ["", "  ", "ab", " ab "] {
            let err = service.generate_course(topic, "owner-1").await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "topic {:?}", topic);
        }

        assert_eq!(generator.outline_calls.load(Ordering::SeqCst), 0);
        assert!(service.get_courses_by_owner("owner-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_outline_is_never_persisted() {
        let mut broken = sample_outline();
        if let Some(modules) = broken.modules.as_mut() {
            modules[0].order = Some(5);
        }
        let store = Arc::new(MemoryStore::new());
        let service = CourseService::new(&state(
            store.clone(),
            Arc::new(ScriptedGenerator::with_outline(Some(broken))),
        ));

        let err = service.generate_course("Linear Algebra", "owner-1").await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
        assert!(service.get_courses_by_owner("owner-1").await.unwrap().is_empty());
        assert_eq!(store.module_count().await, 0);
    }

    #[tokio::test]
    async fn generator_failure_surfaces() {
        let service = CourseService::new(&state(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedGenerator::with_outline(None)),
        ));
        let err = service.generate_course("Linear Algebra", "owner-1").await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));

        let service = CourseService::new(&state(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedGenerator::with_outline(Some(RawOutline::default()))),
        ));
        let err = service.generate_course("Linear Algebra", "owner-1").await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
    }

    #[tokio::test]
    async fn partial_write_is_cleaned_up() {
        let inner = Arc::new(MemoryStore::new());
        let store = Arc::new(FailingLessonsStore {
            inner: inner.clone(),
            fail_from_call: 2,
            calls: AtomicUsize::new(0),
        });
        let service = CourseService::new(&state(store, Arc::new(ScriptedGenerator::new())));

        let err = service.generate_course("Linear Algebra", "owner-1").await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));

        assert!(inner.find_courses_by_owner("owner-1").await.unwrap().is_empty());
        assert_eq!(inner.module_count().await, 0);
        assert_eq!(inner.lesson_count().await, 0);
    }

    #[tokio::test]
    async fn details_are_stable_and_missing_course_is_not_found() {
        let service = CourseService::new(&state(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedGenerator::new()),
        ));
        let created = service.generate_course("Linear Algebra", "owner-1").await.unwrap();

        let first = service.get_course_details(&created.course.id).await.unwrap();
        let second = service.get_course_details(&created.course.id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, created);

        let err = service.get_course_details("missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_is_per_owner_newest_first() {
        let service = CourseService::new(&state(
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedGenerator::new()),
        ));
        let older = service.generate_course("Linear Algebra", "owner-1").await.unwrap();
        let newer = service.generate_course("Calculus", "owner-1").await.unwrap();
        service.generate_course("Topology", "owner-2").await.unwrap();

        let listed = service.get_courses_by_owner("owner-1").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![newer.course.id.as_str(), older.course.id.as_str()]);
    }

    #[tokio::test]
    async fn delete_requires_owner_and_cascades() {
        let store = Arc::new(MemoryStore::new());
        let service = CourseService::new(&state(store.clone(), Arc::new(ScriptedGenerator::new())));
        let created = service.generate_course("Linear Algebra", "owner-1").await.unwrap();
        let course_id = created.course.id.clone();
        store
            .insert_quiz(NewQuiz {
                course_id: course_id.clone(),
                questions: vec![],
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let err = service.delete_course(&course_id, "intruder").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(store.module_count().await, 2);
        assert_eq!(store.lesson_count().await, 5);
        assert_eq!(store.quiz_count().await, 1);

        service.delete_course(&course_id, "owner-1").await.unwrap();
        assert_eq!(store.module_count().await, 0);
        assert_eq!(store.lesson_count().await, 0);
        assert_eq!(store.quiz_count().await, 0);
        assert!(matches!(
            service.get_course_details(&course_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_course(&course_id, "owner-1").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn lessons_are_grouped_by_module() {
        let module = |id: &str, order: u32| CourseModule {
            id: id.to_string(),
            course_id: "c".to_string(),
            title: id.to_string(),
            order,
        };
        let lesson = |module_id: &str, order_no: u32| Lesson {
            id: format!("{}-{}", module_id, order_no),
            module_id: module_id.to_string(),
            title: String::new(),
            order_no,
            content: String::new(),
        };

        let grouped = attach_lessons(
            vec![module("m1", 1), module("m2", 2)],
            vec![lesson("m2", 2), lesson("m1", 1), lesson("m2", 1), lesson("other", 1)],
        );

        assert_eq!(grouped[0].lessons.len(), 1);
        let m2: Vec<&str> = grouped[1].lessons.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(m2, vec!["m2-1", "m2-2"]);
    }
}
