use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};

use super::{CourseStore, StoreError, StoreResult};
use crate::metrics::track_db_operation;
use crate::models::{
    Course, CourseModule, Lesson, NewCourse, NewLesson, NewModule, NewQuiz, Question, Quiz,
};

const COURSES: &str = "courses";
const MODULES: &str = "modules";
const LESSONS: &str = "lessons";
const QUIZZES: &str = "quizzes";

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Serialize, Deserialize)]
struct CourseDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "createdBy")]
    created_by: String,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModuleDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(rename = "courseId")]
    course_id: ObjectId,
    title: String,
    order: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct LessonDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(rename = "moduleId")]
    module_id: ObjectId,
    title: String,
    #[serde(rename = "orderNo")]
    order_no: i32,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct QuestionDocument {
    question: String,
    options: Vec<String>,
    #[serde(rename = "correctOptionIndex")]
    correct_option_index: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct QuizDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    #[serde(rename = "courseId")]
    course_id: ObjectId,
    questions: Vec<QuestionDocument>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    created_at: DateTime<Utc>,
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bson::DateTime::from_millis(date.timestamp_millis()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| D::Error::custom("timestamp out of range"))
    }
}

impl From<CourseDocument> for Course {
    fn from(doc: CourseDocument) -> Self {
        Course {
            id: doc.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: doc.title,
            description: doc.description,
            tags: doc.tags,
            owner_id: doc.created_by,
            created_at: doc.created_at,
        }
    }
}

impl From<ModuleDocument> for CourseModule {
    fn from(doc: ModuleDocument) -> Self {
        CourseModule {
            id: doc.id.map(|id| id.to_hex()).unwrap_or_default(),
            course_id: doc.course_id.to_hex(),
            title: doc.title,
            order: doc.order.max(0) as u32,
        }
    }
}

impl From<LessonDocument> for Lesson {
    fn from(doc: LessonDocument) -> Self {
        Lesson {
            id: doc.id.map(|id| id.to_hex()).unwrap_or_default(),
            module_id: doc.module_id.to_hex(),
            title: doc.title,
            order_no: doc.order_no.max(0) as u32,
            content: doc.content,
        }
    }
}

impl From<QuizDocument> for Quiz {
    fn from(doc: QuizDocument) -> Self {
        Quiz {
            id: doc.id.map(|id| id.to_hex()).unwrap_or_default(),
            course_id: doc.course_id.to_hex(),
            questions: doc
                .questions
                .into_iter()
                .map(|q| Question {
                    question: q.question,
                    options: q.options,
                    correct_option_index: q.correct_option_index.max(0) as u32,
                })
                .collect(),
            created_at: doc.created_at,
        }
    }
}

/// MongoDB-backed store. Multi-document transactions need a replica set,
/// so cascades run as ordered bulk deletes (children before parents).
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Creates the indexes the store relies on. The unique index on
    /// `quizzes.courseId` is what enforces one quiz per course.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        self.quizzes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "courseId": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| backend_error(e, QUIZZES))?;

        self.modules()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "courseId": 1, "order": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| backend_error(e, MODULES))?;

        self.lessons()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "moduleId": 1, "orderNo": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| backend_error(e, LESSONS))?;

        self.courses()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "createdBy": 1, "createdAt": -1 })
                    .build(),
            )
            .await
            .map_err(|e| backend_error(e, COURSES))?;

        tracing::info!("MongoDB indexes ensured");
        Ok(())
    }

    fn courses(&self) -> Collection<CourseDocument> {
        self.db.collection(COURSES)
    }

    fn modules(&self) -> Collection<ModuleDocument> {
        self.db.collection(MODULES)
    }

    fn lessons(&self) -> Collection<LessonDocument> {
        self.db.collection(LESSONS)
    }

    fn quizzes(&self) -> Collection<QuizDocument> {
        self.db.collection(QUIZZES)
    }
}

fn backend_error(err: mongodb::error::Error, collection: &'static str) -> StoreError {
    if let ErrorKind::Write(WriteFailure::WriteError(ref we)) = *err.kind {
        if we.code == DUPLICATE_KEY_CODE {
            return StoreError::Duplicate(collection);
        }
    }
    StoreError::Backend(format!("{} operation failed: {}", collection, err))
}

fn parse_id(value: &str) -> Option<ObjectId> {
    ObjectId::parse_str(value).ok()
}

fn parse_ids(values: &[String]) -> Vec<ObjectId> {
    values.iter().filter_map(|v| parse_id(v)).collect()
}

fn require_id(value: &str, what: &str) -> StoreResult<ObjectId> {
    parse_id(value).ok_or_else(|| StoreError::Backend(format!("Invalid {} id: {}", what, value)))
}

fn inserted_object_id(ids: &std::collections::HashMap<usize, Bson>, index: usize) -> StoreResult<ObjectId> {
    ids.get(&index)
        .and_then(|id| id.as_object_id())
        .ok_or_else(|| StoreError::Backend("Insertion did not return ObjectId".to_string()))
}

#[async_trait]
impl CourseStore for MongoStore {
    async fn insert_course(&self, course: NewCourse) -> StoreResult<Course> {
        let mut document = CourseDocument {
            id: None,
            title: course.title,
            description: course.description,
            tags: course.tags,
            created_by: course.owner_id,
            created_at: course.created_at,
        };

        let result = track_db_operation("insert_one", COURSES, async {
            self.courses().insert_one(&document).await
        })
        .await
        .map_err(|e| backend_error(e, COURSES))?;

        document.id = result.inserted_id.as_object_id();
        if document.id.is_none() {
            return Err(StoreError::Backend(
                "Course insertion did not return ObjectId".to_string(),
            ));
        }
        Ok(document.into())
    }

    async fn insert_modules(
        &self,
        course_id: &str,
        modules: Vec<NewModule>,
    ) -> StoreResult<Vec<CourseModule>> {
        if modules.is_empty() {
            return Ok(Vec::new());
        }
        let course_oid = require_id(course_id, "course")?;

        let documents: Vec<ModuleDocument> = modules
            .into_iter()
            .map(|m| ModuleDocument {
                id: None,
                course_id: course_oid,
                title: m.title,
                order: m.order as i32,
            })
            .collect();

        let result = track_db_operation("insert_many", MODULES, async {
            self.modules().insert_many(&documents).await
        })
        .await
        .map_err(|e| backend_error(e, MODULES))?;

        documents
            .into_iter()
            .enumerate()
            .map(|(index, mut document)| -> StoreResult<_> {
                document.id = Some(inserted_object_id(&result.inserted_ids, index)?);
                Ok(document.into())
            })
            .collect()
    }

    async fn insert_lessons(
        &self,
        module_id: &str,
        lessons: Vec<NewLesson>,
    ) -> StoreResult<Vec<Lesson>> {
        if lessons.is_empty() {
            return Ok(Vec::new());
        }
        let module_oid = require_id(module_id, "module")?;

        let documents: Vec<LessonDocument> = lessons
            .into_iter()
            .map(|l| LessonDocument {
                id: None,
                module_id: module_oid,
                title: l.title,
                order_no: l.order_no as i32,
                content: l.content,
            })
            .collect();

        let result = track_db_operation("insert_many", LESSONS, async {
            self.lessons().insert_many(&documents).await
        })
        .await
        .map_err(|e| backend_error(e, LESSONS))?;

        documents
            .into_iter()
            .enumerate()
            .map(|(index, mut document)| -> StoreResult<_> {
                document.id = Some(inserted_object_id(&result.inserted_ids, index)?);
                Ok(document.into())
            })
            .collect()
    }

    async fn find_course(&self, course_id: &str) -> StoreResult<Option<Course>> {
        let Some(oid) = parse_id(course_id) else {
            return Ok(None);
        };

        let found = track_db_operation("find_one", COURSES, async {
            self.courses().find_one(doc! { "_id": oid }).await
        })
        .await
        .map_err(|e| backend_error(e, COURSES))?;

        Ok(found.map(Course::from))
    }

    async fn find_courses_by_owner(&self, owner_id: &str) -> StoreResult<Vec<Course>> {
        let documents: Vec<CourseDocument> = track_db_operation("find", COURSES, async {
            self.courses()
                .find(doc! { "createdBy": owner_id })
                .sort(doc! { "createdAt": -1, "_id": -1 })
                .await?
                .try_collect::<Vec<_>>()
                .await
        })
        .await
        .map_err(|e| backend_error(e, COURSES))?;

        Ok(documents.into_iter().map(Course::from).collect())
    }

    async fn find_modules(&self, course_id: &str) -> StoreResult<Vec<CourseModule>> {
        let Some(oid) = parse_id(course_id) else {
            return Ok(Vec::new());
        };

        let documents: Vec<ModuleDocument> = track_db_operation("find", MODULES, async {
            self.modules()
                .find(doc! { "courseId": oid })
                .sort(doc! { "order": 1 })
                .await?
                .try_collect::<Vec<_>>()
                .await
        })
        .await
        .map_err(|e| backend_error(e, MODULES))?;

        Ok(documents.into_iter().map(CourseModule::from).collect())
    }

    async fn find_lessons(&self, module_ids: &[String]) -> StoreResult<Vec<Lesson>> {
        let oids = parse_ids(module_ids);
        if oids.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<LessonDocument> = track_db_operation("find", LESSONS, async {
            self.lessons()
                .find(doc! { "moduleId": { "$in": oids } })
                .sort(doc! { "orderNo": 1 })
                .await?
                .try_collect::<Vec<_>>()
                .await
        })
        .await
        .map_err(|e| backend_error(e, LESSONS))?;

        Ok(documents.into_iter().map(Lesson::from).collect())
    }

    async fn delete_lessons(&self, module_ids: &[String]) -> StoreResult<u64> {
        let oids = parse_ids(module_ids);
        if oids.is_empty() {
            return Ok(0);
        }

        let result = track_db_operation("delete_many", LESSONS, async {
            self.lessons()
                .delete_many(doc! { "moduleId": { "$in": oids } })
                .await
        })
        .await
        .map_err(|e| backend_error(e, LESSONS))?;

        Ok(result.deleted_count)
    }

    async fn delete_modules(&self, course_id: &str) -> StoreResult<u64> {
        let Some(oid) = parse_id(course_id) else {
            return Ok(0);
        };

        let result = track_db_operation("delete_many", MODULES, async {
            self.modules().delete_many(doc! { "courseId": oid }).await
        })
        .await
        .map_err(|e| backend_error(e, MODULES))?;

        Ok(result.deleted_count)
    }

    async fn delete_course(&self, course_id: &str) -> StoreResult<u64> {
        let Some(oid) = parse_id(course_id) else {
            return Ok(0);
        };

        let result = track_db_operation("delete_one", COURSES, async {
            self.courses().delete_one(doc! { "_id": oid }).await
        })
        .await
        .map_err(|e| backend_error(e, COURSES))?;

        Ok(result.deleted_count)
    }

    async fn insert_quiz(&self, quiz: NewQuiz) -> StoreResult<Quiz> {
        let course_oid = require_id(&quiz.course_id, "course")?;

        let mut document = QuizDocument {
            id: None,
            course_id: course_oid,
            questions: quiz
                .questions
                .into_iter()
                .map(|q| QuestionDocument {
                    question: q.question,
                    options: q.options,
                    correct_option_index: q.correct_option_index as i32,
                })
                .collect(),
            created_at: quiz.created_at,
        };

        let result = track_db_operation("insert_one", QUIZZES, async {
            self.quizzes().insert_one(&document).await
        })
        .await
        .map_err(|e| backend_error(e, QUIZZES))?;

        document.id = result.inserted_id.as_object_id();
        Ok(document.into())
    }

    async fn find_quiz(&self, course_id: &str) -> StoreResult<Option<Quiz>> {
        let Some(oid) = parse_id(course_id) else {
            return Ok(None);
        };

        let found = track_db_operation("find_one", QUIZZES, async {
            self.quizzes().find_one(doc! { "courseId": oid }).await
        })
        .await
        .map_err(|e| backend_error(e, QUIZZES))?;

        Ok(found.map(Quiz::from))
    }

    async fn delete_quiz(&self, course_id: &str) -> StoreResult<u64> {
        let Some(oid) = parse_id(course_id) else {
            return Ok(0);
        };

        let result = track_db_operation("delete_one", QUIZZES, async {
            self.quizzes().delete_one(doc! { "courseId": oid }).await
        })
        .await
        .map_err(|e| backend_error(e, QUIZZES))?;

        Ok(result.deleted_count)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Backend(format!("MongoDB ping failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_ids_are_skipped() {
        let ids = vec![
            "507f1f77bcf86cd799439011".to_string(),
            "not-an-object-id".to_string(),
        ];
        assert_eq!(parse_ids(&ids).len(), 1);
        assert!(parse_id("xyz").is_none());
    }

    #[test]
    fn course_document_maps_owner_field() {
        let oid = ObjectId::new();
        let course = Course::from(CourseDocument {
            id: Some(oid),
            title: "Linear Algebra".to_string(),
            description: String::new(),
            tags: vec!["math".to_string()],
            created_by: "auth0|42".to_string(),
            created_at: Utc::now(),
        });

        assert_eq!(course.id, oid.to_hex());
        assert_eq!(course.owner_id, "auth0|42");
    }

    #[test]
    fn quiz_document_uses_original_field_names() {
        let document = QuizDocument {
            id: None,
            course_id: ObjectId::new(),
            questions: vec![QuestionDocument {
                question: "q".to_string(),
                options: vec!["a".to_string(), "b".to_string()],
                correct_option_index: 1,
            }],
            created_at: Utc::now(),
        };

        let bson = mongodb::bson::to_document(&document).unwrap();
        assert!(bson.contains_key("courseId"));
        assert!(!bson.contains_key("_id"));
        let questions = bson.get_array("questions").unwrap();
        let first = questions[0].as_document().unwrap();
        assert_eq!(first.get_i32("correctOptionIndex").unwrap(), 1);
    }
}
