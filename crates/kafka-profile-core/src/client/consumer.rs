use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{ClusterClient, KafkaClient, MetadataConsumer, OffsetTime};
use crate::error::{ClientError, Result};

/// [`MetadataConsumer`] on top of a [`KafkaClient`].
pub struct KafkaMetadataConsumer {
    client: KafkaClient,
    high_water_marks: DashMap<String, HashMap<i32, i64>>,
    closed: AtomicBool,
}

impl KafkaMetadataConsumer {
    pub(crate) fn new(client: KafkaClient) -> Self {
        Self {
            client,
            high_water_marks: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataConsumer for KafkaMetadataConsumer {
    async fn topics(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        self.client.topics().await
    }

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        self.ensure_open()?;
        self.client.partitions(topic).await
    }

    async fn high_water_mark(&self, topic: &str, partition: i32) -> Result<i64> {
        self.ensure_open()?;
        let offset = self
            .client
            .get_offset(topic, partition, OffsetTime::Latest)
            .await?;
        self.high_water_marks
            .entry(topic.to_string())
            .or_default()
            .insert(partition, offset);
        Ok(offset)
    }

    fn high_water_marks(&self) -> HashMap<String, HashMap<i32, i64>> {
        self.high_water_marks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ClientError::Closed);
        }
        debug!("metadata consumer closed");
        Ok(())
    }
}
