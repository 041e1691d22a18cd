pub mod course;
pub mod quiz;

pub use course::{
    Course, CourseDetails, CourseModule, GenerateCourseRequest, Lesson, MessageResponse,
    ModuleWithLessons, NewCourse, NewLesson, NewModule,
};
pub use quiz::{NewQuiz, PublicQuestion, PublicQuiz, Question, Quiz, QuizResult, SubmitQuizRequest};
