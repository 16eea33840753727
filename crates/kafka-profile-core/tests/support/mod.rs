//! Shared fixtures for the integration tests.

#![allow(dead_code)]

pub mod mock_broker;

use std::sync::Arc;

use bytes::Bytes;
use kafka_protocol::messages::list_groups_response::ListedGroup;
use kafka_protocol::messages::list_offsets_response::{
    ListOffsetsPartitionResponse, ListOffsetsTopicResponse,
};
use kafka_protocol::messages::{
    BrokerId, FindCoordinatorRequest, FindCoordinatorResponse, GroupId, ListGroupsResponse, ListOffsetsRequest,
    ListOffsetsResponse, MetadataRequest, SaslAuthenticateResponse, SaslHandshakeRequest,
    SaslHandshakeResponse,
};
use kafka_protocol::protocol::StrBytes;

use kafka_profile_core::{ClientProfile, KafkaClient, TransportLogger};

use mock_broker::{api_keys, responses, BrokerCall, MockBroker};

/// Broker id the mock cluster reports for itself.
pub const BROKER_ID: i32 = 1;

/// Topic only returned when asked for by name.
pub const HIDDEN_TOPIC: &str = "late-arrival";

/// Group whose coordinator is still being elected.
pub const ELECTING_GROUP: &str = "rebalancing";

const UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;
const COORDINATOR_NOT_AVAILABLE: i16 = 15;
const UNSUPPORTED_SASL_MECHANISM: i16 = 33;

/// Latest offset the mock reports for `partition`.
pub fn latest_offset(partition: i32) -> i64 {
    1000 + i64::from(partition) * 100
}

/// Earliest offset the mock reports for every partition.
pub const EARLIEST_OFFSET: i64 = 10;

/// A one-broker cluster:
///
/// - `orders`: partitions 0 and 1 led by broker 1, partition 2 leaderless
/// - `payments`: one partition, replicas 1 and 2
/// - [`HIDDEN_TOPIC`]: two partitions, missing from full listings
pub struct TestCluster {
    pub broker: MockBroker,
}

impl TestCluster {
    pub async fn start() -> Self {
        let mut broker = MockBroker::new();
        broker.start().await.expect("mock broker binds");
        let port = broker.port();

        broker
            .register_handler(api_keys::METADATA, Arc::new(move |call: &BrokerCall| metadata(call, port)))
            .await;
        broker
            .register_handler(api_keys::LIST_OFFSETS, Arc::new(list_offsets))
            .await;
        broker
            .register_handler(
                api_keys::FIND_COORDINATOR,
                Arc::new(move |call: &BrokerCall| find_coordinator(call, port)),
            )
            .await;
        broker
            .register_handler(api_keys::LIST_GROUPS, Arc::new(list_groups))
            .await;
        broker
            .register_handler(api_keys::SASL_HANDSHAKE, Arc::new(sasl_handshake))
            .await;
        broker
            .register_handler(
                api_keys::SASL_AUTHENTICATE,
                Arc::new(|call: &BrokerCall| responses::encode(call, &SaslAuthenticateResponse::default())),
            )
            .await;

        Self { broker }
    }

    pub fn servers(&self) -> Vec<String> {
        vec![self.broker.address().to_string()]
    }

    pub async fn connect(&self, profile: ClientProfile) -> KafkaClient {
        KafkaClient::connect(Arc::new(profile), &self.servers(), TransportLogger::disabled())
            .await
            .expect("client connects to mock cluster")
    }
}

fn metadata(call: &BrokerCall, port: i32) -> Bytes {
    let request: MetadataRequest = call.request();

    let known = |name: &str| match name {
        "orders" => Some(responses::metadata_topic("orders", &[BROKER_ID, BROKER_ID, -1], &[BROKER_ID])),
        "payments" => Some(responses::metadata_topic("payments", &[BROKER_ID], &[BROKER_ID, 2])),
        HIDDEN_TOPIC => Some(responses::metadata_topic(HIDDEN_TOPIC, &[BROKER_ID, BROKER_ID], &[BROKER_ID])),
        _ => None,
    };

    let requested: Vec<String> = request
        .topics
        .unwrap_or_default()
        .into_iter()
        .filter_map(|t| t.name.map(|n| n.to_string()))
        .collect();

    let topics = if requested.is_empty() {
        ["orders", "payments"].iter().filter_map(|name| known(name)).collect()
    } else {
        requested
            .iter()
            .map(|name| {
                known(name)
                    .unwrap_or_else(|| responses::metadata_topic_error(name, UNKNOWN_TOPIC_OR_PARTITION))
            })
            .collect()
    };

    responses::encode(call, &responses::metadata(BROKER_ID, "127.0.0.1", port, topics))
}

fn list_offsets(call: &BrokerCall) -> Bytes {
    let request: ListOffsetsRequest = call.request();

    let mut response = ListOffsetsResponse::default();
    for topic in request.topics {
        let mut answer = ListOffsetsTopicResponse::default();
        answer.name = topic.name;
        for partition in topic.partitions {
            let offset = match partition.timestamp {
                -2 => EARLIEST_OFFSET,
                _ => latest_offset(partition.partition_index),
            };
            let mut entry = ListOffsetsPartitionResponse::default();
            entry.partition_index = partition.partition_index;
            if call.api_version == 0 {
                entry.old_style_offsets = vec![offset];
            } else {
                entry.offset = offset;
            }
            answer.partitions.push(entry);
        }
        response.topics.push(answer);
    }
    responses::encode(call, &response)
}

fn find_coordinator(call: &BrokerCall, port: i32) -> Bytes {
    let request: FindCoordinatorRequest = call.request();

    let mut response = FindCoordinatorResponse::default();
    if request.key.to_string() == ELECTING_GROUP {
        response.error_code = COORDINATOR_NOT_AVAILABLE;
        response.node_id = BrokerId(-1);
        response.port = -1;
    } else {
        response.node_id = BrokerId(BROKER_ID);
        response.host = StrBytes::from_static_str("127.0.0.1");
        response.port = port;
    }
    responses::encode(call, &response)
}

fn list_groups(call: &BrokerCall) -> Bytes {
    let mut response = ListGroupsResponse::default();
    for (group_id, protocol_type) in [("lag-checker", "consumer"), ("s3-sink", "connect")] {
        let mut group = ListedGroup::default();
        group.group_id = GroupId::from(StrBytes::from_static_str(group_id));
        group.protocol_type = StrBytes::from_static_str(protocol_type);
        response.groups.push(group);
    }
    responses::encode(call, &response)
}

fn sasl_handshake(call: &BrokerCall) -> Bytes {
    const ENABLED: [&str; 3] = ["SCRAM-SHA-256", "SCRAM-SHA-512", "OAUTHBEARER"];
    let request: SaslHandshakeRequest = call.request();

    let mut response = SaslHandshakeResponse::default();
    if !ENABLED.contains(&&*request.mechanism) {
        response.error_code = UNSUPPORTED_SASL_MECHANISM;
    }
    response.mechanisms = ENABLED.iter().map(|m| StrBytes::from_static_str(m)).collect();
    responses::encode(call, &response)
}
