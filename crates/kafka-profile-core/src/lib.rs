//! Kafka client profiles and cluster capabilities
//!
//! This library turns named client profiles from a settings tree into
//! connected Kafka clients, and hides those clients behind small traits so
//! callers can be tested without a cluster.
//!
//! # Architecture
//!
//! - [`settings`] - Hierarchical settings read by dotted path
//! - [`version`] - Kafka release resolution and request version selection
//! - [`profile`] - Builds a [`ClientProfile`] from a named profile section
//! - [`tls`] - Certificate loading and the TLS connector
//! - [`auth`] - SASL/SCRAM and IAM token authentication settings
//! - [`broker`] - Broker connections and the [`ClusterBroker`] capability
//! - [`client`] - The [`ClusterClient`] capability and its Kafka implementation
//! - [`logging`] - Routes transport chatter into `tracing`
//! - [`error`] - Domain-specific error types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kafka_profile_core::{ClusterClient, KafkaClient, ProfileBuilder, Settings, TransportLogger};
//!
//! let settings = Settings::from_file("config.yaml")?;
//! let profile = Arc::new(ProfileBuilder::new(&settings).build("prod")?);
//! let client = KafkaClient::connect(profile, &servers, TransportLogger::current()).await?;
//! println!("{:?}", client.topics().await?);
//! ```

#![forbid(unsafe_code)]

pub mod auth;
pub mod broker;
pub mod client;
pub mod error;
pub mod logging;
pub mod profile;
pub mod settings;
pub mod tls;
pub mod version;

/// `mockall` doubles of the cluster traits.
///
/// Only available when compiling tests or with the `testing` feature.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::{AuthConfig, IamIdentity, SaslMechanism, ScramMechanism, StaticTokenProvider, TokenProvider};
pub use broker::{BrokerConnection, ClusterBroker, KafkaBroker};
pub use client::{ClusterClient, KafkaClient, KafkaMetadataConsumer, MetadataConsumer, OffsetTime};
pub use error::{ClientError, ConfigError, Result, TlsError, TokenError, TransportError};
pub use logging::TransportLogger;
pub use profile::{ClientProfile, ProfileBuilder};
pub use settings::{ConfigSource, Settings};
pub use tls::{TlsConnector, TlsDescriptor, TlsProfile};
pub use version::{resolve_version, KafkaVersion, RequestVersions};
