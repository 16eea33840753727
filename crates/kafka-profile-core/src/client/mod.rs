//! Cluster client capability.
//!
//! Everything above the transport talks to a cluster through
//! [`ClusterClient`], so it can run against the real [`KafkaClient`] or a
//! `mockall` double (`MockClusterClient`, behind the `testing` feature).
//!
//! ```rust,ignore
//! let profile = Arc::new(ProfileBuilder::new(&settings).build("prod")?);
//! let client = KafkaClient::connect(profile, &servers, TransportLogger::current()).await?;
//! for topic in client.topics().await? {
//!     let partitions = client.partitions(&topic).await?;
//! }
//! ```

mod consumer;
mod kafka;
mod metadata;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::ClusterBroker;
use crate::error::Result;
use crate::profile::ClientProfile;

pub use consumer::KafkaMetadataConsumer;
pub use kafka::KafkaClient;

/// Point in a partition's log to ask offsets for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffsetTime {
    /// The oldest offset still available.
    Earliest,
    /// The offset the next produced message will get.
    Latest,
    /// The first offset at or after this timestamp (ms since epoch).
    Timestamp(i64),
}

impl OffsetTime {
    /// The value sent in a ListOffsets request.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Earliest => -2,
            Self::Latest => -1,
            Self::Timestamp(ms) => ms,
        }
    }
}

impl From<i64> for OffsetTime {
    fn from(value: i64) -> Self {
        match value {
            -2 => Self::Earliest,
            -1 => Self::Latest,
            ms => Self::Timestamp(ms),
        }
    }
}

/// Operations callers need against a cluster.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// The profile this client was built from. Never changes.
    fn profile(&self) -> Arc<ClientProfile>;

    /// Brokers from the last metadata load.
    async fn brokers(&self) -> Result<Vec<Arc<dyn ClusterBroker>>>;

    /// Topic names, sorted.
    async fn topics(&self) -> Result<Vec<String>>;

    /// Partition ids of `topic`, sorted.
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>>;

    /// Partition ids of `topic` that currently have a leader.
    async fn writable_partitions(&self, topic: &str) -> Result<Vec<i32>>;

    async fn leader(&self, topic: &str, partition: i32) -> Result<Arc<dyn ClusterBroker>>;

    async fn replicas(&self, topic: &str, partition: i32) -> Result<Vec<i32>>;

    async fn in_sync_replicas(&self, topic: &str, partition: i32) -> Result<Vec<i32>>;

    /// Reload metadata for `topics`; an empty slice reloads every topic.
    async fn refresh_metadata(&self, topics: &[String]) -> Result<()>;

    /// Ask the partition leader for the offset at `time`.
    async fn get_offset(&self, topic: &str, partition: i32, time: OffsetTime) -> Result<i64>;

    /// Coordinator of a consumer group, from cache when known.
    async fn coordinator(&self, group: &str) -> Result<Arc<dyn ClusterBroker>>;

    async fn refresh_coordinator(&self, group: &str) -> Result<()>;

    /// Mark the client closed and drop its connections. Broker handles
    /// given out earlier keep theirs open until their owners close them.
    async fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// A consumer for following partition log ends.
    async fn metadata_consumer(&self) -> Result<Box<dyn MetadataConsumer>>;

    /// Consumer group id to protocol type, for every group in the cluster.
    async fn list_consumer_groups(&self) -> Result<HashMap<String, String>>;
}

/// Follows log-end offsets through its parent client.
///
/// Closing the consumer leaves the parent client open.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MetadataConsumer: Send + Sync {
    async fn topics(&self) -> Result<Vec<String>>;

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>>;

    /// Fetch the latest offset of a partition and remember it.
    async fn high_water_mark(&self, topic: &str, partition: i32) -> Result<i64>;

    /// Every offset remembered so far, by topic then partition.
    fn high_water_marks(&self) -> HashMap<String, HashMap<i32, i64>>;

    async fn close(&self) -> Result<()>;
}
