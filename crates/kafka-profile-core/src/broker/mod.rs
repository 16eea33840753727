//! Broker handles.
//!
//! [`ClusterBroker`] is the narrow view callers get of one cluster member.
//! [`KafkaBroker`] implements it over a shared [`BrokerConnection`].

pub mod connection;

use std::sync::Arc;

use async_trait::async_trait;
use kafka_protocol::messages::{ListOffsetsRequest, ListOffsetsResponse};

use crate::error::Result;

pub use connection::BrokerConnection;

/// Broker id used when the id is not known, e.g. for bootstrap servers.
pub const UNKNOWN_BROKER_ID: i32 = -1;

/// One broker, as handed out by a cluster client.
///
/// Handles are not tracked by the client: whoever acquires one closes it.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ClusterBroker: Send + Sync {
    /// Broker id, or [`UNKNOWN_BROKER_ID`].
    fn id(&self) -> i32;

    /// Close the connection to this broker.
    async fn close(&self) -> Result<()>;

    async fn is_connected(&self) -> bool;

    /// Ask the broker for offsets. The request must target partitions this
    /// broker leads.
    async fn get_available_offsets(&self, request: ListOffsetsRequest) -> Result<ListOffsetsResponse>;
}

/// [`ClusterBroker`] backed by a real connection.
#[derive(Debug, Clone)]
pub struct KafkaBroker {
    connection: Arc<BrokerConnection>,
}

impl KafkaBroker {
    pub fn new(connection: Arc<BrokerConnection>) -> Self {
        Self { connection }
    }

    pub fn address(&self) -> String {
        self.connection.address()
    }
}

#[async_trait]
impl ClusterBroker for KafkaBroker {
    fn id(&self) -> i32 {
        self.connection.broker_id()
    }

    async fn close(&self) -> Result<()> {
        self.connection.disconnect().await;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    async fn get_available_offsets(&self, request: ListOffsetsRequest) -> Result<ListOffsetsResponse> {
        let version = self.connection.versions().list_offsets;
        Ok(self.connection.send(&request, version).await?)
    }
}
