//! [`ClusterClient`] over real broker connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use kafka_protocol::messages::list_offsets_request::{ListOffsetsPartition, ListOffsetsTopic};
use kafka_protocol::messages::metadata_request::MetadataRequestTopic;
use kafka_protocol::messages::{
    BrokerId, FindCoordinatorRequest, ListGroupsRequest, ListOffsetsRequest, MetadataRequest,
    TopicName,
};
use kafka_protocol::protocol::StrBytes;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use super::metadata::MetadataCache;
use super::{ClusterClient, KafkaMetadataConsumer, MetadataConsumer, OffsetTime};
use crate::auth::{AuthConfig, TokenProvider};
use crate::broker::{BrokerConnection, ClusterBroker, KafkaBroker, UNKNOWN_BROKER_ID};
use crate::error::{ClientError, Result, TransportError};
use crate::logging::TransportLogger;
use crate::profile::ClientProfile;
use crate::version::{KafkaVersion, RequestVersions};

/// Kafka's COORDINATOR_NOT_AVAILABLE.
const COORDINATOR_NOT_AVAILABLE: i16 = 15;

struct ClientInner {
    profile: Arc<ClientProfile>,
    versions: RequestVersions,
    logger: TransportLogger,
    token_provider: Option<Arc<dyn TokenProvider>>,
    /// The bootstrap server that answered; metadata and coordinator
    /// lookups go through it.
    seed: Arc<BrokerConnection>,
    metadata: RwLock<MetadataCache>,
    connections: DashMap<i32, Arc<BrokerConnection>>,
    coordinators: DashMap<String, i32>,
    closed: AtomicBool,
}

/// Cluster client backed by `kafka-protocol` connections.
///
/// Cheap to clone; clones share connections and cached metadata.
#[derive(Clone)]
pub struct KafkaClient {
    inner: Arc<ClientInner>,
}

impl KafkaClient {
    /// Connect through the first reachable bootstrap server and load
    /// metadata for every topic.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoBrokersAvailable`] if no server answers,
    /// or a transport error if the profile needs a token provider.
    pub async fn connect(
        profile: Arc<ClientProfile>,
        bootstrap_servers: &[String],
        logger: TransportLogger,
    ) -> Result<Self> {
        Self::open(profile, bootstrap_servers, logger, None).await
    }

    /// Like [`connect`], for profiles using IAM authentication.
    ///
    /// # Errors
    ///
    /// Same as [`connect`].
    ///
    /// [`connect`]: KafkaClient::connect
    pub async fn connect_with_token_provider(
        profile: Arc<ClientProfile>,
        bootstrap_servers: &[String],
        logger: TransportLogger,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Result<Self> {
        Self::open(profile, bootstrap_servers, logger, Some(token_provider)).await
    }

    #[instrument(skip_all, fields(profile = %profile.name))]
    async fn open(
        profile: Arc<ClientProfile>,
        bootstrap_servers: &[String],
        logger: TransportLogger,
        token_provider: Option<Arc<dyn TokenProvider>>,
    ) -> Result<Self> {
        if matches!(profile.auth, AuthConfig::AwsIam(_)) && token_provider.is_none() {
            return Err(TransportError::MissingTokenProvider(profile.name.clone()).into());
        }

        for server in bootstrap_servers {
            let Some((host, port)) = parse_address(server) else {
                warn!(server = %server, "ignoring malformed bootstrap server");
                continue;
            };

            let seed = Arc::new(BrokerConnection::new(
                UNKNOWN_BROKER_ID,
                host,
                port,
                Arc::clone(&profile),
                token_provider.clone(),
                logger.clone(),
            ));
            if let Err(e) = seed.connect().await {
                warn!(server = %server, error = %e, "bootstrap server unavailable");
                continue;
            }

            let client = Self {
                inner: Arc::new(ClientInner {
                    versions: profile.version.request_versions(),
                    profile: Arc::clone(&profile),
                    logger: logger.clone(),
                    token_provider: token_provider.clone(),
                    seed,
                    metadata: RwLock::new(MetadataCache::default()),
                    connections: DashMap::new(),
                    coordinators: DashMap::new(),
                    closed: AtomicBool::new(false),
                }),
            };
            if let Err(e) = client.load_metadata(&[]).await {
                warn!(server = %server, error = %e, "bootstrap server failed to return metadata");
                client.inner.seed.disconnect().await;
                continue;
            }

            info!(server = %server, version = %profile.version, "connected to cluster");
            return Ok(client);
        }

        Err(ClientError::NoBrokersAvailable)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        Ok(())
    }

    fn require_version(&self, operation: &'static str, required: KafkaVersion) -> Result<()> {
        let configured = self.inner.profile.version;
        if configured.is_at_least(required) {
            Ok(())
        } else {
            Err(ClientError::UnsupportedVersion {
                operation,
                required: required.to_string(),
                configured: configured.to_string(),
            })
        }
    }

    /// Send a Metadata request; an empty `topics` asks for the whole cluster.
    async fn load_metadata(&self, topics: &[String]) -> Result<()> {
        let version = self.inner.versions.metadata;

        let mut request = MetadataRequest::default();
        request.topics = if topics.is_empty() {
            // v0 has no null topic list; an empty one means "all".
            (version == 0).then(Vec::new)
        } else {
            Some(
                topics
                    .iter()
                    .map(|name| {
                        let mut topic = MetadataRequestTopic::default();
                        topic.name = Some(TopicName::from(StrBytes::from_string(name.clone())));
                        topic
                    })
                    .collect(),
            )
        };
        if version >= 4 {
            request.allow_auto_topic_creation = false;
        }

        let response = self.inner.seed.send(&request, version).await?;
        debug!(
            brokers = response.brokers.len(),
            topics = response.topics.len(),
            "received metadata"
        );

        self.inner
            .metadata
            .write()
            .await
            .apply(&response, topics.is_empty());
        Ok(())
    }

    /// Load `topic` once if the cache does not know it yet.
    async fn fill_topic(&self, topic: &str) -> Result<()> {
        if self.inner.metadata.read().await.has_topic(topic) {
            return Ok(());
        }
        self.load_metadata(&[topic.to_string()]).await
    }

    /// The connection for a broker in the metadata cache, opened lazily.
    async fn connection(&self, broker_id: i32) -> Result<Arc<BrokerConnection>> {
        if let Some(connection) = self.inner.connections.get(&broker_id) {
            return Ok(Arc::clone(&connection));
        }

        let (host, port) = {
            let metadata = self.inner.metadata.read().await;
            let address = metadata
                .broker(broker_id)
                .ok_or(ClientError::UnknownBroker(broker_id))?;
            (address.host.clone(), address.port)
        };
        Ok(self.connection_to(broker_id, &host, port))
    }

    fn connection_to(&self, broker_id: i32, host: &str, port: i32) -> Arc<BrokerConnection> {
        let entry = self.inner.connections.entry(broker_id).or_insert_with(|| {
            Arc::new(BrokerConnection::new(
                broker_id,
                host,
                port,
                Arc::clone(&self.inner.profile),
                self.inner.token_provider.clone(),
                self.inner.logger.clone(),
            ))
        });
        Arc::clone(&entry)
    }

    async fn broker(&self, broker_id: i32) -> Result<Arc<dyn ClusterBroker>> {
        let connection = self.connection(broker_id).await?;
        Ok(Arc::new(KafkaBroker::new(connection)))
    }

    async fn leader_id(&self, topic: &str, partition: i32) -> Result<i32> {
        self.fill_topic(topic).await?;
        let metadata = self.inner.metadata.read().await;
        let leader = metadata.partition(topic, partition)?.leader;
        if leader < 0 {
            return Err(ClientError::LeaderNotAvailable {
                topic: topic.to_string(),
                partition,
            });
        }
        Ok(leader)
    }
}

#[async_trait]
impl ClusterClient for KafkaClient {
    fn profile(&self) -> Arc<ClientProfile> {
        Arc::clone(&self.inner.profile)
    }

    async fn brokers(&self) -> Result<Vec<Arc<dyn ClusterBroker>>> {
        self.ensure_open()?;
        let ids: Vec<i32> = self
            .inner
            .metadata
            .read()
            .await
            .brokers()
            .map(|(id, _)| id)
            .collect();

        let mut brokers = Vec::with_capacity(ids.len());
        for id in ids {
            brokers.push(self.broker(id).await?);
        }
        Ok(brokers)
    }

    async fn topics(&self) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.inner.metadata.read().await.topics())
    }

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>> {
        self.ensure_open()?;
        self.fill_topic(topic).await?;
        self.inner.metadata.read().await.partitions(topic, false)
    }

    async fn writable_partitions(&self, topic: &str) -> Result<Vec<i32>> {
        self.ensure_open()?;
        self.fill_topic(topic).await?;
        self.inner.metadata.read().await.partitions(topic, true)
    }

    async fn leader(&self, topic: &str, partition: i32) -> Result<Arc<dyn ClusterBroker>> {
        self.ensure_open()?;
        let leader = self.leader_id(topic, partition).await?;
        self.broker(leader).await
    }

    async fn replicas(&self, topic: &str, partition: i32) -> Result<Vec<i32>> {
        self.ensure_open()?;
        self.fill_topic(topic).await?;
        let metadata = self.inner.metadata.read().await;
        Ok(metadata.partition(topic, partition)?.replicas.clone())
    }

    async fn in_sync_replicas(&self, topic: &str, partition: i32) -> Result<Vec<i32>> {
        self.ensure_open()?;
        self.fill_topic(topic).await?;
        let metadata = self.inner.metadata.read().await;
        Ok(metadata.partition(topic, partition)?.isr.clone())
    }

    async fn refresh_metadata(&self, topics: &[String]) -> Result<()> {
        self.ensure_open()?;
        self.load_metadata(topics).await
    }

    async fn get_offset(&self, topic: &str, partition: i32, time: OffsetTime) -> Result<i64> {
        self.ensure_open()?;
        let leader = self.leader(topic, partition).await?;
        let version = self.inner.versions.list_offsets;

        let mut request_partition = ListOffsetsPartition::default();
        request_partition.partition_index = partition;
        request_partition.timestamp = time.as_i64();
        if version == 0 {
            request_partition.max_num_offsets = 1;
        }
        let mut request_topic = ListOffsetsTopic::default();
        request_topic.name = TopicName::from(StrBytes::from_string(topic.to_string()));
        request_topic.partitions.push(request_partition);
        let mut request = ListOffsetsRequest::default();
        request.replica_id = BrokerId(-1);
        request.topics.push(request_topic);

        let response = leader.get_available_offsets(request).await?;
        let unknown = || ClientError::UnknownPartition {
            topic: topic.to_string(),
            partition,
        };
        let answer = response
            .topics
            .iter()
            .filter(|t| t.name.to_string() == topic)
            .flat_map(|t| t.partitions.iter())
            .find(|p| p.partition_index == partition)
            .ok_or_else(unknown)?;

        if answer.error_code != 0 {
            return Err(ClientError::Kafka {
                code: answer.error_code,
                context: format!("list offsets {topic}/{partition}"),
            });
        }

        if version == 0 {
            answer.old_style_offsets.first().copied().ok_or_else(unknown)
        } else {
            Ok(answer.offset)
        }
    }

    async fn coordinator(&self, group: &str) -> Result<Arc<dyn ClusterBroker>> {
        self.ensure_open()?;
        self.require_version("coordinator lookup", KafkaVersion::V0_8_2_0)?;

        let cached = self.inner.coordinators.get(group).map(|id| *id);
        let broker_id = match cached {
            Some(id) => id,
            None => {
                self.refresh_coordinator(group).await?;
                self.inner
                    .coordinators
                    .get(group)
                    .map(|id| *id)
                    .ok_or_else(|| ClientError::CoordinatorNotAvailable(group.to_string()))?
            }
        };

        self.broker(broker_id).await
    }

    async fn refresh_coordinator(&self, group: &str) -> Result<()> {
        self.ensure_open()?;
        self.require_version("coordinator lookup", KafkaVersion::V0_8_2_0)?;

        let mut request = FindCoordinatorRequest::default();
        request.key = StrBytes::from_string(group.to_string());

        let response = self
            .inner
            .seed
            .send(&request, self.inner.versions.find_coordinator)
            .await?;

        match response.error_code {
            0 => {}
            COORDINATOR_NOT_AVAILABLE => {
                return Err(ClientError::CoordinatorNotAvailable(group.to_string()))
            }
            code => {
                return Err(ClientError::Kafka {
                    code,
                    context: format!("find coordinator for group {group}"),
                })
            }
        }

        let broker_id = response.node_id.0;
        self.connection_to(broker_id, &response.host.to_string(), response.port);
        self.inner.coordinators.insert(group.to_string(), broker_id);
        debug!(group, broker_id, "coordinator found");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(ClientError::Closed);
        }

        self.inner.seed.disconnect().await;
        let connections: Vec<Arc<BrokerConnection>> = self
            .inner
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.inner.connections.clear();

        // Connections behind broker handles handed out earlier belong to
        // those handles now.
        for connection in connections {
            if Arc::strong_count(&connection) == 1 {
                connection.disconnect().await;
            }
        }

        info!(profile = %self.inner.profile.name, "client closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    async fn metadata_consumer(&self) -> Result<Box<dyn MetadataConsumer>> {
        self.ensure_open()?;
        Ok(Box::new(KafkaMetadataConsumer::new(self.clone())))
    }

    async fn list_consumer_groups(&self) -> Result<HashMap<String, String>> {
        self.ensure_open()?;
        self.require_version("listing consumer groups", KafkaVersion::V0_9_0_0)?;

        let ids: Vec<i32> = self
            .inner
            .metadata
            .read()
            .await
            .brokers()
            .map(|(id, _)| id)
            .collect();

        // Each broker only knows the groups it coordinates.
        let mut groups = HashMap::new();
        for id in ids {
            let connection = self.connection(id).await?;
            let response = connection
                .send(&ListGroupsRequest::default(), self.inner.versions.list_groups)
                .await?;
            if response.error_code != 0 {
                return Err(ClientError::Kafka {
                    code: response.error_code,
                    context: format!("list groups on broker {id}"),
                });
            }
            groups.extend(
                response
                    .groups
                    .iter()
                    .map(|g| (g.group_id.to_string(), g.protocol_type.to_string())),
            );
        }
        Ok(groups)
    }
}

impl std::fmt::Debug for KafkaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaClient")
            .field("profile", &self.inner.profile.name)
            .field("seed", &self.inner.seed.address())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Split `host:port`. IPv6 literals go in brackets.
fn parse_address(server: &str) -> Option<(String, i32)> {
    let (host, port) = server.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = port.parse().ok()?;
    (!host.is_empty()).then(|| (host.to_string(), port))
}
