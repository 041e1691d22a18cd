use redis::aio::ConnectionManager;
use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::generator::{ContentGenerator, LlmContentGenerator};
use crate::store::{CourseStore, MemoryStore, MongoStore};

pub mod cache;
pub mod course_service;
pub mod quiz_service;

pub use cache::CourseCache;
pub use course_service::CourseService;
pub use quiz_service::QuizService;

/// Process-wide resource handles, initialized once and shared by every request.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn CourseStore>,
    pub generator: Arc<dyn ContentGenerator>,
    pub cache: CourseCache,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn CourseStore> = match config.store_backend {
            StoreBackend::Mongo => {
                let client = mongodb::Client::with_uri_str(&config.mongo_uri).await?;
                let store = MongoStore::new(client.database(&config.mongo_database));
                store.ensure_indexes().await?;
                tracing::info!("MongoDB connected ({})", config.mongo_database);
                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store, data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let cache = match &config.redis_uri {
            Some(uri) => CourseCache::new(connect_redis(uri).await?, config.cache_ttl_secs),
            None => {
                tracing::info!("REDIS_URI not set, course cache disabled");
                CourseCache::disabled()
            }
        };

        let generator: Arc<dyn ContentGenerator> =
            Arc::new(LlmContentGenerator::new(&config.generator));

        Ok(Self::with_components(config, store, generator, cache))
    }

    pub fn with_components(
        config: Config,
        store: Arc<dyn CourseStore>,
        generator: Arc<dyn ContentGenerator>,
        cache: CourseCache,
    ) -> Self {
        Self {
            config,
            store,
            generator,
            cache,
        }
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");

    let client = redis::Client::open(uri)?;
    let redis = tokio::time::timeout(
        std::time::Duration::from_secs(30),
        ConnectionManager::new(client),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
