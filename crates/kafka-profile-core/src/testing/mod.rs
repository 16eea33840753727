//! Doubles for code that depends on the cluster traits.
//!
//! ```rust,ignore
//! use kafka_profile_core::testing::MockClusterClient;
//!
//! let mut client = MockClusterClient::new();
//! client.expect_topics().returning(|| Ok(vec!["orders".to_string()]));
//! ```

pub use crate::broker::MockClusterBroker;
pub use crate::client::{MockClusterClient, MockMetadataConsumer};
