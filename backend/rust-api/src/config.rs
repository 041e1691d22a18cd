use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Identifier used for every protected request when auth is disabled.
pub const DEV_USER_ID: &str = "dev-user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("Unknown store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    /// Character budget for course material sent along with a quiz request
    pub max_content_chars: usize,
    pub quiz_question_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub audience: Option<String>,
    pub issuer: Option<String>,
    /// No-auth mode: every protected request runs as [`DEV_USER_ID`]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub mongo_uri: String,
    pub mongo_database: String,
    pub redis_uri: Option<String>,
    pub cache_ttl_secs: u64,
    pub auth: AuthConfig,
    pub generator: GeneratorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0:8081".to_string(),
            store_backend: StoreBackend::Mongo,
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "coursegen".to_string(),
            redis_uri: None,
            cache_ttl_secs: 300,
            auth: AuthConfig {
                jwt_secret: "dev-secret-only-for-local-testing".to_string(),
                audience: None,
                issuer: None,
                disabled: false,
            },
            generator: GeneratorConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 90,
                temperature: 0.4,
                max_content_chars: 24_000,
                quiz_question_count: 10,
            },
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Local .env first, ignore if missing
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let string = |key: &str, var: &str, default: &str| -> String {
            settings
                .get_string(key)
                .or_else(|_| env::var(var))
                .unwrap_or_else(|_| default.to_string())
        };
        let optional = |key: &str, var: &str| -> Option<String> {
            settings
                .get_string(key)
                .or_else(|_| env::var(var))
                .ok()
                .filter(|v| !v.trim().is_empty())
        };
        let number = |key: &str, var: &str, default: u64| -> Result<u64, config::ConfigError> {
            match optional(key, var) {
                Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                    config::ConfigError::Message(format!("{} must be a number, got '{}'", var, raw))
                }),
                None => Ok(default),
            }
        };

        let store_backend = match optional("store.backend", "STORE_BACKEND") {
            Some(raw) => raw.parse().map_err(config::ConfigError::Message)?,
            None => defaults.store_backend,
        };

        let auth_disabled = optional("auth.disabled", "AUTH_DISABLED")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let jwt_secret = match optional("auth.jwt_secret", "JWT_SECRET") {
            Some(secret) => secret,
            None if app_env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ))
            }
            None => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                defaults.auth.jwt_secret.clone()
            }
        };

        if auth_disabled && app_env == "prod" {
            return Err(config::ConfigError::Message(
                "AUTH_DISABLED is not allowed in production".to_string(),
            ));
        }

        let temperature = match optional("generator.temperature", "LLM_TEMPERATURE") {
            Some(raw) => raw.trim().parse::<f32>().map_err(|_| {
                config::ConfigError::Message(format!("LLM_TEMPERATURE must be a number, got '{}'", raw))
            })?,
            None => defaults.generator.temperature,
        };

        let max_content_chars = usize::try_from(number(
            "generator.max_content_chars",
            "LLM_MAX_CONTENT_CHARS",
            defaults.generator.max_content_chars as u64,
        )?)
        .map_err(|_| out_of_range("LLM_MAX_CONTENT_CHARS"))?;
        let quiz_question_count = u32::try_from(number(
            "generator.quiz_question_count",
            "QUIZ_QUESTION_COUNT",
            u64::from(defaults.generator.quiz_question_count),
        )?)
        .map_err(|_| out_of_range("QUIZ_QUESTION_COUNT"))?;

        Ok(Config {
            bind_addr: string("server.bind_addr", "BIND_ADDR", &defaults.bind_addr),
            store_backend,
            mongo_uri: string("database.mongo_uri", "MONGO_URI", &defaults.mongo_uri),
            mongo_database: string(
                "database.mongo_database",
                "MONGO_DATABASE",
                &defaults.mongo_database,
            ),
            redis_uri: optional("redis.uri", "REDIS_URI"),
            cache_ttl_secs: number("redis.cache_ttl_secs", "CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            auth: AuthConfig {
                jwt_secret,
                audience: optional("auth.audience", "AUTH_AUDIENCE"),
                issuer: optional("auth.issuer", "AUTH_ISSUER"),
                disabled: auth_disabled,
            },
            generator: GeneratorConfig {
                base_url: string(
                    "generator.base_url",
                    "LLM_BASE_URL",
                    &defaults.generator.base_url,
                ),
                api_key: string("generator.api_key", "LLM_API_KEY", ""),
                model: string("generator.model", "LLM_MODEL", &defaults.generator.model),
                timeout_secs: number(
                    "generator.timeout_secs",
                    "LLM_TIMEOUT_SECS",
                    defaults.generator.timeout_secs,
                )?,
                temperature,
                max_content_chars,
                quiz_question_count,
            },
        })
    }
}

fn out_of_range(var: &str) -> config::ConfigError {
    config::ConfigError::Message(format!("{} is out of range", var))
}
