use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Pipeline};
use tracing::debug;

use super::MetadataStore;
use crate::descriptor::ThumbnailDescriptor;
use crate::error::MetadataError;

/// Redis metadata store.
///
/// Layout:
/// - `{prefix}:sources` is a set of registered source ids
/// - `{prefix}:sources:{source_id}` is a hash of `size -> descriptor JSON`
///
/// `get_many` pipelines one hash read per source into a single round trip.
#[derive(Clone)]
pub struct RedisMetadataStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisMetadataStore {
    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> Result<Self, MetadataError> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, prefix))
    }

    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn sources_key(&self) -> String {
        format!("{}:sources", self.prefix)
    }

    fn source_key(&self, source_id: &str) -> String {
        format!("{}:sources:{source_id}", self.prefix)
    }
}

fn decode(raw: &str) -> Result<ThumbnailDescriptor, MetadataError> {
    Ok(serde_json::from_str(raw)?)
}

#[async_trait]
impl MetadataStore for RedisMetadataStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn supports_batch(&self) -> bool {
        true
    }

    async fn get_one(
        &self,
        source_id: &str,
        size: &str,
    ) -> Result<Option<ThumbnailDescriptor>, MetadataError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(self.source_key(source_id), size).await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn get_all(&self, source_id: &str) -> Result<Vec<ThumbnailDescriptor>, MetadataError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(self.source_key(source_id)).await?;
        let mut descriptors = raw
            .values()
            .map(|value| decode(value))
            .collect::<Result<Vec<_>, _>>()?;
        descriptors.sort_by(|a, b| a.size.cmp(&b.size));
        Ok(descriptors)
    }

    async fn get_many(
        &self,
        source_ids: &[String],
        sizes: Option<&[String]>,
    ) -> Result<HashMap<String, Vec<ThumbnailDescriptor>>, MetadataError> {
        if source_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.conn.clone();
        let mut pipe = Pipeline::new();
        let mut result = HashMap::with_capacity(source_ids.len());

        match sizes {
            Some([]) => return Ok(result),
            Some(sizes) => {
                let fields = sizes.to_vec();
                for source_id in source_ids {
                    pipe.cmd("HMGET").arg(self.source_key(source_id)).arg(&fields);
                }
                let rows: Vec<Vec<Option<String>>> = pipe.query_async(&mut conn).await?;
                for (source_id, row) in source_ids.iter().zip(rows) {
                    let descriptors = row
                        .iter()
                        .flatten()
                        .map(|value| decode(value))
                        .collect::<Result<Vec<_>, _>>()?;
                    result.insert(source_id.clone(), descriptors);
                }
            }
            None => {
                for source_id in source_ids {
                    pipe.hgetall(self.source_key(source_id));
                }
                let rows: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;
                for (source_id, row) in source_ids.iter().zip(rows) {
                    let descriptors = row
                        .values()
                        .map(|value| decode(value))
                        .collect::<Result<Vec<_>, _>>()?;
                    result.insert(source_id.clone(), descriptors);
                }
            }
        }

        debug!(sources = source_ids.len(), "Redis batch prefetch");
        Ok(result)
    }

    async fn add(&self, descriptor: &ThumbnailDescriptor) -> Result<(), MetadataError> {
        let value = serde_json::to_string(descriptor)?;
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(
            self.source_key(&descriptor.source_id),
            &descriptor.size,
            value,
        )
        .await?;
        Ok(())
    }

    async fn add_source(&self, source_id: &str) -> Result<(), MetadataError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(self.sources_key(), source_id).await?;
        Ok(())
    }

    async fn remove(&self, source_id: &str, size: &str) -> Result<bool, MetadataError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.hdel(self.source_key(source_id), size).await?;
        Ok(removed > 0)
    }
}
