//! Cached cluster metadata.

use std::collections::{BTreeMap, HashMap};

use kafka_protocol::messages::MetadataResponse;

use crate::error::{ClientError, Result};

/// Kafka's LEADER_NOT_AVAILABLE. The layout is still usable.
const LEADER_NOT_AVAILABLE: i16 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BrokerAddress {
    pub host: String,
    pub port: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PartitionMetadata {
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

/// Brokers and topic layout as last reported by the cluster.
#[derive(Debug, Default)]
pub(crate) struct MetadataCache {
    brokers: BTreeMap<i32, BrokerAddress>,
    topics: HashMap<String, BTreeMap<i32, PartitionMetadata>>,
}

impl MetadataCache {
    /// Fold a metadata response in. A full refresh forgets topics the
    /// response no longer mentions; topics reported with an error other
    /// than LEADER_NOT_AVAILABLE are dropped.
    pub fn apply(&mut self, response: &MetadataResponse, full: bool) {
        self.brokers = response
            .brokers
            .iter()
            .map(|b| {
                (
                    b.node_id.0,
                    BrokerAddress {
                        host: b.host.to_string(),
                        port: b.port,
                    },
                )
            })
            .collect();

        if full {
            self.topics.clear();
        }

        for topic in &response.topics {
            let Some(name) = &topic.name else {
                continue;
            };
            let name = name.to_string();

            if topic.error_code != 0 && topic.error_code != LEADER_NOT_AVAILABLE {
                self.topics.remove(&name);
                continue;
            }

            let partitions = topic
                .partitions
                .iter()
                .map(|p| {
                    (
                        p.partition_index,
                        PartitionMetadata {
                            leader: p.leader_id.0,
                            replicas: p.replica_nodes.iter().map(|id| id.0).collect(),
                            isr: p.isr_nodes.iter().map(|id| id.0).collect(),
                        },
                    )
                })
                .collect();
            self.topics.insert(name, partitions);
        }
    }

    pub fn brokers(&self) -> impl Iterator<Item = (i32, &BrokerAddress)> {
        self.brokers.iter().map(|(id, addr)| (*id, addr))
    }

    pub fn broker(&self, id: i32) -> Option<&BrokerAddress> {
        self.brokers.get(&id)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Topic names, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Partition ids, sorted. With `writable_only`, partitions without a
    /// leader are left out.
    pub fn partitions(&self, topic: &str, writable_only: bool) -> Result<Vec<i32>> {
        let partitions = self
            .topics
            .get(topic)
            .ok_or_else(|| ClientError::UnknownTopic(topic.to_string()))?;
        Ok(partitions
            .iter()
            .filter(|(_, p)| !writable_only || p.leader >= 0)
            .map(|(id, _)| *id)
            .collect())
    }

    pub fn partition(&self, topic: &str, partition: i32) -> Result<&PartitionMetadata> {
        self.topics
            .get(topic)
            .ok_or_else(|| ClientError::UnknownTopic(topic.to_string()))?
            .get(&partition)
            .ok_or_else(|| ClientError::UnknownPartition {
                topic: topic.to_string(),
                partition,
            })
    }
}
