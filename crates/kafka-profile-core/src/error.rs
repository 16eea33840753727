//! Domain error types for client profiles and cluster operations.
//!
//! Uses `thiserror` for ergonomic error definitions with proper context.

use thiserror::Error;

/// Errors raised while turning settings into a [`ClientProfile`].
///
/// All of these are startup-time failures. None is retried; the caller
/// decides whether to abort.
///
/// [`ClientProfile`]: crate::profile::ClientProfile
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The named client profile has no `client-profile.<name>` section.
    #[error("unknown client-profile '{0}'")]
    UnknownProfile(String),

    /// The version string is neither strict nor a known legacy alias.
    #[error("unknown Kafka version: '{0}'")]
    UnknownVersion(String),

    /// TLS material could not be loaded or assembled.
    #[error("tls.{profile}: {source}")]
    Tls {
        profile: String,
        #[source]
        source: TlsError,
    },

    /// SASL mechanism is not one of the supported SCRAM variants.
    #[error("sasl.{profile}: unsupported mechanism '{mechanism}' (expected SCRAM-SHA-256 or SCRAM-SHA-512)")]
    UnknownSaslMechanism { profile: String, mechanism: String },

    /// IAM authentication needs a region.
    #[error("iam.{0}: region is required")]
    MissingIamRegion(String),

    /// IAM tokens must never travel over an unencrypted channel.
    #[error("client-profile {profile} uses iam.{iam} but has no tls profile")]
    IamRequiresTls { profile: String, iam: String },

    /// A value is present but cannot be used.
    #[error("invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to read the settings file.
    #[error("failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML settings.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Errors loading TLS material.
#[derive(Error, Debug)]
pub enum TlsError {
    /// A certificate file could not be read.
    #[error("cannot read certificate file '{path}': {message}")]
    CertificateLoad { path: String, message: String },

    /// A private key file could not be read.
    #[error("cannot read private key file '{path}': {message}")]
    PrivateKeyLoad { path: String, message: String },

    /// The file was readable but held no PEM certificates.
    #[error("no certificates found in '{0}'")]
    NoCertificates(String),

    /// The file was readable but held no PEM private key.
    #[error("no private key found in '{0}'")]
    NoPrivateKeys(String),

    /// rustls rejected the assembled configuration (e.g. cert/key mismatch).
    #[error("invalid TLS configuration: {0}")]
    Config(String),
}

/// A [`TokenProvider`] could not mint a token.
///
/// [`TokenProvider`]: crate::auth::TokenProvider
#[derive(Error, Debug)]
#[error("token provider failed: {0}")]
pub struct TokenError(pub String);

/// Errors talking to a broker over the wire.
#[derive(Error, Debug)]
pub enum TransportError {
    /// TCP/IO error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// Dialing the broker exceeded the profile's dial timeout.
    #[error("timed out dialing broker {broker_id} at {address}")]
    DialTimeout { broker_id: i32, address: String },

    /// Waiting for a response exceeded the profile's read timeout.
    #[error("timed out waiting for broker {broker_id} to answer")]
    ReadTimeout { broker_id: i32 },

    /// The broker handle has no open connection.
    #[error("broker {broker_id} is not connected")]
    NotConnected { broker_id: i32 },

    /// TLS handshake failed.
    #[error("TLS handshake with {address} failed: {message}")]
    Handshake { address: String, message: String },

    /// SASL exchange failed.
    #[error("SASL authentication with broker {broker_id} failed: {message}")]
    Authentication { broker_id: i32, message: String },

    /// The token provider failed while authenticating.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// IAM auth was configured but no token provider was supplied.
    #[error("profile '{0}' uses IAM authentication but no token provider was supplied")]
    MissingTokenProvider(String),

    /// Failed to encode a request.
    #[error("protocol encode error: {message}")]
    Encode { message: String },

    /// Failed to decode a response.
    #[error("protocol decode error: {message}")]
    Decode { message: String },

    /// The response did not belong to the request just sent.
    #[error("correlation ID mismatch: expected {expected}, got {actual}")]
    CorrelationIdMismatch { expected: i32, actual: i32 },
}

/// Errors returned by cluster operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network-level failure, passed through untranslated.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// None of the bootstrap servers could be reached.
    #[error("no brokers available")]
    NoBrokersAvailable,

    /// The topic is not present in cluster metadata.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// The partition is not present in the topic's metadata.
    #[error("unknown partition {partition} for topic {topic}")]
    UnknownPartition { topic: String, partition: i32 },

    /// The partition currently has no leader.
    #[error("no leader available for {topic}/{partition}")]
    LeaderNotAvailable { topic: String, partition: i32 },

    /// The leader id in metadata does not match any known broker.
    #[error("broker {0} is not in cluster metadata")]
    UnknownBroker(i32),

    /// No coordinator could be found for the consumer group.
    #[error("no coordinator available for consumer group {0}")]
    CoordinatorNotAvailable(String),

    /// The configured protocol version is too old for the operation.
    #[error("{operation} requires Kafka {required} or newer (profile uses {configured})")]
    UnsupportedVersion {
        operation: &'static str,
        required: String,
        configured: String,
    },

    /// The broker answered with a Kafka error code.
    #[error("broker returned error code {code} for {context}")]
    Kafka { code: i16, context: String },

    /// The client has been closed.
    #[error("client is closed")]
    Closed,
}

/// Result type alias for cluster operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for wire operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Result type alias for TLS loading.
pub type TlsResult<T> = std::result::Result<T, TlsError>;
