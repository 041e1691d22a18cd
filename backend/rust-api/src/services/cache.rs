use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;

use crate::metrics::{record_cache_hit, record_cache_miss, track_cache_operation};
use crate::models::CourseDetails;

const DETAILS_KEY_PREFIX: &str = "course:details:";
const PING_TIMEOUT: Duration = Duration::from_millis(500);

/// Read-through cache for course details. Without a Redis connection every
/// call is a no-op; Redis failures are logged and otherwise ignored.
#[derive(Clone)]
pub struct CourseCache {
    redis: Option<ConnectionManager>,
    ttl_secs: u64,
}

fn details_key(course_id: &str) -> String {
    format!("{}{}", DETAILS_KEY_PREFIX, course_id)
}

impl CourseCache {
    pub fn new(redis: ConnectionManager, ttl_secs: u64) -> Self {
        Self {
            redis: Some(redis),
            ttl_secs,
        }
    }

    pub fn disabled() -> Self {
        Self {
            redis: None,
            ttl_secs: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.redis.is_some()
    }

    pub async fn get_details(&self, course_id: &str) -> Option<CourseDetails> {
        let mut conn = self.redis.clone()?;
        let key = details_key(course_id);

        let cached = track_cache_operation("get", conn.get::<_, Option<String>>(&key)).await;
        match cached {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(details) => {
                    record_cache_hit();
                    Some(details)
                }
                Err(e) => {
                    tracing::warn!("Discarding unreadable cache entry {}: {}", key, e);
                    record_cache_miss();
                    None
                }
            },
            Ok(None) => {
                record_cache_miss();
                None
            }
            Err(e) => {
                tracing::debug!("Cache read failed for {}: {}", key, e);
                record_cache_miss();
                None
            }
        }
    }

    pub async fn put_details(&self, details: &CourseDetails) {
        let Some(mut conn) = self.redis.clone() else {
            return;
        };
        let key = details_key(&details.course.id);

        let payload = match serde_json::to_string(details) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to serialize course details for cache: {}", e);
                return;
            }
        };

        let result: Result<(), _> =
            track_cache_operation("set", conn.set_ex(&key, payload, self.ttl_secs)).await;
        if let Err(e) = result {
            tracing::debug!("Cache write failed for {}: {}", key, e);
        }
    }

    pub async fn invalidate_details(&self, course_id: &str) {
        let Some(mut conn) = self.redis.clone() else {
            return;
        };
        let key = details_key(course_id);

        let result: Result<(), _> = track_cache_operation("del", conn.del(&key)).await;
        match result {
            Ok(()) => tracing::debug!("Invalidated cache entry {}", key),
            Err(e) => tracing::warn!("Cache invalidation failed for {}: {}", key, e),
        }
    }

    /// `None` when caching is disabled.
    pub async fn ping(&self) -> Option<Result<(), String>> {
        let mut conn = self.redis.clone()?;
        let result = tokio::time::timeout(
            PING_TIMEOUT,
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await;

        Some(match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("Redis error: {}", e)),
            Err(_) => Err("Redis timeout after 500ms".to_string()),
        })
    }
}
