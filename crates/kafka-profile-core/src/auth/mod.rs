//! Authentication descriptors for broker connections.
//!
//! A profile authenticates in one of three ways:
//!
//! - no SASL at all (TLS alone may still be in use),
//! - SASL/SCRAM with a username and password from a `sasl.<name>` section,
//! - AWS IAM, sending short-lived tokens over SASL/OAUTHBEARER. Tokens come
//!   from a caller-supplied [`TokenProvider`]; the profile only records the
//!   inputs from the `iam.<name>` section.
//!
//! ```yaml
//! sasl:
//!   scram:
//!     mechanism: SCRAM-SHA-256
//!     handshake-first: true
//!     username: burrow
//!     password: secret
//! iam:
//!   eks:
//!     region: us-west-1
//!     role-arn: arn:aws:iam::123456789012:role/burrow
//! ```

pub mod scram;

use std::fmt;

use async_trait::async_trait;

use crate::error::TokenError;

/// SCRAM hash variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScramMechanism {
    Sha256,
    Sha512,
}

impl ScramMechanism {
    /// Parse the Kafka mechanism name. Only the exact names are accepted.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SCRAM-SHA-256" => Some(Self::Sha256),
            "SCRAM-SHA-512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "SCRAM-SHA-256",
            Self::Sha512 => "SCRAM-SHA-512",
        }
    }
}

impl fmt::Display for ScramMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SASL mechanism announced in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaslMechanism {
    Scram(ScramMechanism),
    OAuthBearer,
}

impl SaslMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scram(m) => m.as_str(),
            Self::OAuthBearer => "OAUTHBEARER",
        }
    }
}

impl fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs for minting IAM tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IamIdentity {
    pub region: String,
    pub role_arn: Option<String>,
    /// Named AWS credentials profile.
    pub profile: Option<String>,
}

/// How a profile authenticates to brokers.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AuthConfig {
    #[default]
    None,
    Scram {
        mechanism: ScramMechanism,
        handshake_first: bool,
        username: String,
        password: String,
    },
    AwsIam(IamIdentity),
}

impl AuthConfig {
    /// The SASL mechanism, or `None` when SASL is not used.
    pub fn mechanism(&self) -> Option<SaslMechanism> {
        match self {
            Self::None => None,
            Self::Scram { mechanism, .. } => Some(SaslMechanism::Scram(*mechanism)),
            Self::AwsIam(_) => Some(SaslMechanism::OAuthBearer),
        }
    }

    /// Whether a SaslHandshake request precedes the exchange.
    pub fn handshake_first(&self) -> bool {
        match self {
            Self::None => false,
            Self::Scram { handshake_first, .. } => *handshake_first,
            Self::AwsIam(_) => true,
        }
    }

    pub fn is_sasl(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Scram {
                mechanism,
                handshake_first,
                username,
                password: _,
            } => f
                .debug_struct("Scram")
                .field("mechanism", mechanism)
                .field("handshake_first", handshake_first)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::AwsIam(identity) => f.debug_tuple("AwsIam").field(identity).finish(),
        }
    }
}

/// Source of OAUTHBEARER tokens for IAM authentication.
///
/// Called once per broker connection, so implementations should cache and
/// refresh tokens themselves.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, identity: &IamIdentity) -> Result<String, TokenError>;
}

/// Hands out the same token every time. Useful for tests and for tokens
/// minted outside the process.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _identity: &IamIdentity) -> Result<String, TokenError> {
        Ok(self.token.clone())
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider").finish_non_exhaustive()
    }
}
