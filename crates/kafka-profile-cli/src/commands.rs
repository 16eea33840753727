//! Read-only cluster queries behind the CLI subcommands.
//!
//! Every query takes a `&dyn ClusterClient` and returns a serializable
//! report, so the same code runs against a live cluster or a mock.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use kafka_profile_core::{ClientError, ClientProfile, ClusterClient, OffsetTime};

#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub name: String,
    pub client_id: String,
    pub kafka_version: String,
    pub tls: bool,
    pub client_certificate: bool,
    pub sasl_mechanism: Option<String>,
    pub dial_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl From<&ClientProfile> for ProfileSummary {
    fn from(profile: &ClientProfile) -> Self {
        Self {
            name: profile.name.clone(),
            client_id: profile.client_id.clone(),
            kafka_version: profile.version.to_string(),
            tls: profile.tls_enabled(),
            client_certificate: profile
                .tls
                .as_ref()
                .is_some_and(|tls| tls.has_client_certificate()),
            sasl_mechanism: profile.auth.mechanism().map(|m| m.to_string()),
            dial_timeout_secs: profile.dial_timeout.as_secs(),
            read_timeout_secs: profile.read_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClusterSummary {
    pub profile: ProfileSummary,
    pub brokers: Vec<i32>,
    pub topics: usize,
}

#[derive(Debug, Serialize)]
pub struct TopicSummary {
    pub name: String,
    pub partitions: usize,
    pub writable_partitions: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct PartitionOffsets {
    pub partition: i32,
    pub leader: Option<i32>,
    pub earliest: Option<i64>,
    pub latest: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn check(client: &dyn ClusterClient) -> Result<ClusterSummary> {
    let profile = client.profile();
    let brokers = client
        .brokers()
        .await
        .context("failed to list brokers")?
        .iter()
        .map(|broker| broker.id())
        .collect();
    let topics = client.topics().await.context("failed to list topics")?.len();

    Ok(ClusterSummary {
        profile: ProfileSummary::from(profile.as_ref()),
        brokers,
        topics,
    })
}

pub async fn topics(client: &dyn ClusterClient) -> Result<Vec<TopicSummary>> {
    let mut summaries = Vec::new();
    for name in client.topics().await.context("failed to list topics")? {
        let partitions = client.partitions(&name).await?.len();
        let writable_partitions = client.writable_partitions(&name).await?.len();
        summaries.push(TopicSummary {
            name,
            partitions,
            writable_partitions,
        });
    }
    Ok(summaries)
}

/// Group id to protocol type, sorted by group id.
pub async fn groups(client: &dyn ClusterClient) -> Result<BTreeMap<String, String>> {
    let groups = client
        .list_consumer_groups()
        .await
        .context("failed to list consumer groups")?;
    Ok(groups.into_iter().collect())
}

/// Earliest and latest offsets of every partition of `topic`.
///
/// A partition without a leader is reported with its error instead of
/// failing the whole query.
pub async fn offsets(client: &dyn ClusterClient, topic: &str) -> Result<Vec<PartitionOffsets>> {
    let partitions = client
        .partitions(topic)
        .await
        .with_context(|| format!("failed to list partitions of {topic}"))?;

    let mut report = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let leader = match client.leader(topic, partition).await {
            Ok(leader) => leader,
            Err(e @ ClientError::LeaderNotAvailable { .. }) => {
                report.push(PartitionOffsets {
                    partition,
                    error: Some(e.to_string()),
                    ..PartitionOffsets::default()
                });
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let earliest = client.get_offset(topic, partition, OffsetTime::Earliest).await?;
        let latest = client.get_offset(topic, partition, OffsetTime::Latest).await?;
        report.push(PartitionOffsets {
            partition,
            leader: Some(leader.id()),
            earliest: Some(earliest),
            latest: Some(latest),
            error: None,
        });
    }
    Ok(report)
}
