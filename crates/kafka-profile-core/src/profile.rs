//! Client profiles: named, validated connection settings.
//!
//! A profile lives under `client-profile.<name>` and may point at a
//! `tls.<name>`, a `sasl.<name>` and an `iam.<name>` section:
//!
//! ```yaml
//! client-profile:
//!   prod:
//!     client-id: burrow-prod
//!     kafka-version: "2.8.0"
//!     tls: prod
//!     iam: eks
//!     dial-timeout: 10
//!     read-timeout: 60
//! ```
//!
//! [`ProfileBuilder::build`] reads everything at once, loads TLS files and
//! fails on the first problem. The resulting [`ClientProfile`] is immutable
//! and meant to be shared behind an `Arc`.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::auth::{AuthConfig, IamIdentity, ScramMechanism};
use crate::error::{ConfigError, ConfigResult};
use crate::settings::ConfigSource;
use crate::tls::{TlsDescriptor, TlsProfile};
use crate::version::{resolve_version, KafkaVersion};

pub const DEFAULT_CLIENT_ID: &str = "burrow-lagchecker";
pub const DEFAULT_KAFKA_VERSION: &str = "2.8.0";
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to open connections to a cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientProfile {
    /// Profile name; empty for the default profile.
    pub name: String,
    pub client_id: String,
    pub version: KafkaVersion,
    /// Surface per-partition errors to callers. Always on.
    pub return_errors: bool,
    pub tls: Option<TlsProfile>,
    pub auth: AuthConfig,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ClientProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            version: KafkaVersion::V2_8_0_0,
            return_errors: true,
            tls: None,
            auth: AuthConfig::None,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ClientProfile {
    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

/// Reads one settings section, such as `tls.prod`.
struct Section<'a> {
    source: &'a dyn ConfigSource,
    prefix: String,
}

impl<'a> Section<'a> {
    fn new(source: &'a dyn ConfigSource, kind: &str, name: &str) -> Self {
        Self {
            source,
            prefix: format!("{kind}.{name}"),
        }
    }

    fn key(&self, field: &str) -> String {
        format!("{}.{}", self.prefix, field)
    }

    fn is_set(&self, field: &str) -> bool {
        self.source.is_set(&self.key(field))
    }

    fn string(&self, field: &str) -> String {
        self.source.get_string(&self.key(field))
    }

    fn non_empty(&self, field: &str) -> Option<String> {
        Some(self.string(field)).filter(|s| !s.is_empty())
    }

    fn path(&self, field: &str) -> Option<PathBuf> {
        self.non_empty(field).map(PathBuf::from)
    }

    fn bool(&self, field: &str) -> bool {
        self.source.get_bool(&self.key(field))
    }

    fn seconds(&self, field: &str) -> ConfigResult<Option<Duration>> {
        match self.source.get_int(&self.key(field))? {
            None => Ok(None),
            Some(secs) => u64::try_from(secs)
                .map(|secs| Some(Duration::from_secs(secs)))
                .map_err(|_| ConfigError::InvalidValue {
                    key: self.key(field),
                    message: format!("timeout must not be negative, got {secs}"),
                }),
        }
    }
}

/// Builds [`ClientProfile`]s from a [`ConfigSource`].
pub struct ProfileBuilder<'a> {
    source: &'a dyn ConfigSource,
}

impl<'a> ProfileBuilder<'a> {
    pub fn new(source: &'a dyn ConfigSource) -> Self {
        Self { source }
    }

    /// Build the named profile. The empty name yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found: an unknown profile
    /// or version, unreadable TLS material, an unsupported SASL mechanism,
    /// an IAM section without region, IAM without TLS, or a bad timeout.
    pub fn build(&self, name: &str) -> ConfigResult<ClientProfile> {
        if !name.is_empty() && !self.source.is_set(&format!("client-profile.{name}")) {
            return Err(ConfigError::UnknownProfile(name.to_string()));
        }
        let section = Section::new(self.source, "client-profile", name);

        let client_id = if section.is_set("client-id") {
            section.string("client-id")
        } else {
            DEFAULT_CLIENT_ID.to_string()
        };
        let version = if section.is_set("kafka-version") {
            resolve_version(&section.string("kafka-version"))?
        } else {
            resolve_version(DEFAULT_KAFKA_VERSION)?
        };

        let tls = if section.is_set("tls") {
            Some(self.tls(&section.string("tls"))?)
        } else {
            None
        };

        let mut auth = if section.is_set("sasl") {
            self.sasl(&section.string("sasl"))?
        } else {
            AuthConfig::None
        };

        if let Some(iam_name) = section.non_empty("iam") {
            let identity = self.iam(&iam_name)?;
            if tls.is_none() {
                return Err(ConfigError::IamRequiresTls {
                    profile: name.to_string(),
                    iam: iam_name,
                });
            }
            auth = AuthConfig::AwsIam(identity);
        }

        let dial_timeout = section.seconds("dial-timeout")?.unwrap_or(DEFAULT_DIAL_TIMEOUT);
        let read_timeout = section.seconds("read-timeout")?.unwrap_or(DEFAULT_READ_TIMEOUT);

        info!(
            profile = name,
            client_id = %client_id,
            version = %version,
            tls = tls.is_some(),
            sasl = ?auth.mechanism().map(|m| m.as_str()),
            "built client profile"
        );

        Ok(ClientProfile {
            name: name.to_string(),
            client_id,
            version,
            return_errors: true,
            tls,
            auth,
            dial_timeout,
            read_timeout,
        })
    }

    fn tls(&self, tls_name: &str) -> ConfigResult<TlsProfile> {
        let section = Section::new(self.source, "tls", tls_name);
        let descriptor = TlsDescriptor {
            cert_file: section.path("certfile"),
            key_file: section.path("keyfile"),
            ca_file: section.path("cafile"),
            insecure_skip_verify: section.bool("noverify"),
        };
        debug!(tls = tls_name, ?descriptor, "loading tls profile");

        TlsProfile::load(descriptor).map_err(|source| ConfigError::Tls {
            profile: tls_name.to_string(),
            source,
        })
    }

    fn sasl(&self, sasl_name: &str) -> ConfigResult<AuthConfig> {
        let section = Section::new(self.source, "sasl", sasl_name);
        let name = section.string("mechanism");
        let mechanism =
            ScramMechanism::from_name(&name).ok_or_else(|| ConfigError::UnknownSaslMechanism {
                profile: sasl_name.to_string(),
                mechanism: name.clone(),
            })?;

        Ok(AuthConfig::Scram {
            mechanism,
            handshake_first: section.bool("handshake-first"),
            username: section.string("username"),
            password: section.string("password"),
        })
    }

    fn iam(&self, iam_name: &str) -> ConfigResult<IamIdentity> {
        let section = Section::new(self.source, "iam", iam_name);
        let region = section
            .non_empty("region")
            .ok_or_else(|| ConfigError::MissingIamRegion(iam_name.to_string()))?;

        Ok(IamIdentity {
            region,
            role_arn: section.non_empty("role-arn"),
            profile: section.non_empty("profile"),
        })
    }
}
