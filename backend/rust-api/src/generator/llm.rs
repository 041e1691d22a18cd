//! OpenAI-compatible chat-completions backend for the content generator.
//!
//! Both calls request a strict JSON object. The API key is never logged and
//! completion bodies are only logged by size.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use super::{ContentGenerator, CourseContent, GenerationError, RawOutline, RawQuiz};
use crate::config::GeneratorConfig;

const OUTLINE_SYSTEM_PROMPT: &str = r#"
You are a curriculum designer. Build a complete course for the topic the user gives.

Respond with ONE JSON object and nothing else, using exactly this shape:
{
  "title": string,
  "description": string,
  "tags": [string],
  "modules": [
    {
      "title": string,
      "order": integer,
      "lessons": [
        { "title": string, "orderNo": integer, "content": string }
      ]
    }
  ]
}

Rules:
- 3 to 6 modules; module "order" starts at 1 and increases by 1.
- 2 to 5 lessons per module; lesson "orderNo" starts at 1 within each module.
- "content" is a full lesson body in plain text (several paragraphs), never empty.
"#;

const QUIZ_SYSTEM_PROMPT: &str = r#"
You write final exams for online courses. Use only the course material the user provides.

Respond with ONE JSON object and nothing else, using exactly this shape:
{
  "questions": [
    { "question": string, "options": [string], "correctOptionIndex": integer }
  ]
}

Rules:
- Every question has 4 distinct options.
- "correctOptionIndex" is the zero-based index of the single correct option.
"#;

lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("hardcoded regex should compile");
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UpstreamErrorBody {
    error: UpstreamErrorDetail,
}

#[derive(Deserialize)]
struct UpstreamErrorDetail {
    message: String,
}

pub struct LlmContentGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    temperature: f32,
    max_content_chars: usize,
    quiz_question_count: u32,
}

impl LlmContentGenerator {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            temperature: config.temperature,
            max_content_chars: config.max_content_chars,
            quiz_question_count: config.quiz_question_count,
        }
    }

    #[tracing::instrument(level = "info", skip(self, system, user), fields(model = %self.model))]
    async fn chat_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                r#type: "json_object",
            },
        };

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status,
                message: extract_upstream_error(&body),
            });
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::Malformed(format!("unexpected completion envelope: {}", e))
            }
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Malformed("completion has no content".to_string()))?;

        tracing::info!(response_chars = content.len(), "Content generator responded");

        parse_completion(&content)
    }
}

fn map_transport_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(err.to_string())
    }
}

fn extract_upstream_error(body: &str) -> String {
    serde_json::from_str::<UpstreamErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

/// Parses a completion as JSON, tolerating a surrounding Markdown code fence.
pub(crate) fn parse_completion<T: DeserializeOwned>(content: &str) -> Result<T, GenerationError> {
    let json = CODE_FENCE
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| content.trim());

    serde_json::from_str(json).map_err(|e| GenerationError::Malformed(e.to_string()))
}

#[async_trait]
impl ContentGenerator for LlmContentGenerator {
    async fn outline(&self, topic: &str) -> Result<RawOutline, GenerationError> {
        let user = format!("Topic: {}", topic);
        self.chat_json(OUTLINE_SYSTEM_PROMPT, &user).await
    }

    async fn quiz(&self, content: &CourseContent) -> Result<RawQuiz, GenerationError> {
        let user = format!(
            "Write exactly {} questions covering the whole course.\n\n{}",
            self.quiz_question_count,
            content.render(self.max_content_chars)
        );
        self.chat_json(QUIZ_SYSTEM_PROMPT, &user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_json() {
        let quiz: RawQuiz = parse_completion(r#"{"questions": []}"#).unwrap();
        assert_eq!(quiz.questions.map(|q| q.len()), Some(0));
    }

    #[test]
    fn strips_code_fences() {
        let content = "```json\n{\"title\": \"Rust\", \"modules\": []}\n```";
        let outline: RawOutline = parse_completion(content).unwrap();
        assert_eq!(outline.title.as_deref(), Some("Rust"));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_completion::<RawOutline>("Sure! Here is your course.").unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[test]
    fn upstream_error_message_is_extracted() {
        let body = r#"{"error": {"message": "rate limited", "type": "requests"}}"#;
        assert_eq!(extract_upstream_error(body), "rate limited");
        assert_eq!(extract_upstream_error("plain failure"), "plain failure");
    }
}
