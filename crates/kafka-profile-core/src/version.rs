//! Kafka protocol version resolution.
//!
//! Since 1.0 Kafka releases follow semver, so those strings have a single
//! format. Older releases were written in several styles (`0.10.2.1`,
//! `0.10.2`, `0.10`), and only the four-part form parses strictly. The other
//! spellings are kept in a fallback table so existing configuration files
//! keep working.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConfigError, ConfigResult};

/// A released version of the Kafka wire protocol.
///
/// Ordered component-wise, so `V0_10_2_0 < V0_11_0_0 < V1_0_0_0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KafkaVersion([u32; 4]);

impl KafkaVersion {
    pub const V0_8_2_0: Self = Self::new(0, 8, 2, 0);
    pub const V0_8_2_1: Self = Self::new(0, 8, 2, 1);
    pub const V0_8_2_2: Self = Self::new(0, 8, 2, 2);
    pub const V0_9_0_0: Self = Self::new(0, 9, 0, 0);
    pub const V0_10_0_0: Self = Self::new(0, 10, 0, 0);
    pub const V0_10_1_0: Self = Self::new(0, 10, 1, 0);
    pub const V0_10_2_0: Self = Self::new(0, 10, 2, 0);
    pub const V0_11_0_0: Self = Self::new(0, 11, 0, 0);
    pub const V1_0_0_0: Self = Self::new(1, 0, 0, 0);
    pub const V2_0_0_0: Self = Self::new(2, 0, 0, 0);
    pub const V2_2_0_0: Self = Self::new(2, 2, 0, 0);
    pub const V2_8_0_0: Self = Self::new(2, 8, 0, 0);

    /// Create a version from its four components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, very_minor: u32, patch: u32) -> Self {
        Self([major, minor, very_minor, patch])
    }

    /// Parse the canonical grammar only.
    ///
    /// Strings starting with `0` must use the four-part `0.a.b.c` form;
    /// anything else must be `major.minor.patch`.
    #[must_use]
    pub fn parse_strict(s: &str) -> Option<Self> {
        static LEGACY: OnceLock<Regex> = OnceLock::new();
        static SEMVER: OnceLock<Regex> = OnceLock::new();

        if s.len() < 5 {
            return None;
        }

        let numbers = |captures: regex::Captures<'_>| -> Option<[u32; 3]> {
            let mut out = [0u32; 3];
            for (slot, i) in out.iter_mut().zip(1..=3) {
                *slot = captures.get(i)?.as_str().parse().ok()?;
            }
            Some(out)
        };

        if s.starts_with('0') {
            let re = LEGACY.get_or_init(|| {
                Regex::new(r"^0\.(\d+)\.(\d+)\.(\d+)$").expect("valid regex")
            });
            let [minor, very_minor, patch] = numbers(re.captures(s)?)?;
            Some(Self::new(0, minor, very_minor, patch))
        } else {
            let re = SEMVER
                .get_or_init(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").expect("valid regex"));
            let [major, minor, very_minor] = numbers(re.captures(s)?)?;
            Some(Self::new(major, minor, very_minor, 0))
        }
    }

    /// Check whether this version is `other` or newer.
    #[must_use]
    pub fn is_at_least(&self, other: Self) -> bool {
        *self >= other
    }

    /// Request API versions to use against a cluster running this release.
    #[must_use]
    pub fn request_versions(&self) -> RequestVersions {
        RequestVersions::for_version(*self)
    }
}

// Only support back as far as 0.8.2: a configured 0.8.0 or 0.8.1 really
// means the closest release the protocol layer distinguishes.
const LEGACY_FALLBACK: &[(&str, KafkaVersion)] = &[
    ("", KafkaVersion::V0_10_2_0),
    ("0.8.0", KafkaVersion::V0_8_2_0),
    ("0.8.1", KafkaVersion::V0_8_2_1),
    ("0.8.2", KafkaVersion::V0_8_2_2),
    ("0.8", KafkaVersion::V0_8_2_0),
    ("0.9.0", KafkaVersion::V0_9_0_0),
    ("0.9", KafkaVersion::V0_9_0_0),
    ("0.10.0", KafkaVersion::V0_10_0_0),
    ("0.10.1", KafkaVersion::V0_10_1_0),
    ("0.10.2", KafkaVersion::V0_10_2_0),
    ("0.10", KafkaVersion::V0_10_0_0),
    ("0.11.0", KafkaVersion::V0_11_0_0),
    ("0.11", KafkaVersion::V0_11_0_0),
];

/// Resolve a configured version string to a protocol version.
///
/// Strict parsing wins; otherwise the legacy table is consulted.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownVersion`] if neither path matches.
pub fn resolve_version(version: &str) -> ConfigResult<KafkaVersion> {
    if let Some(parsed) = KafkaVersion::parse_strict(version) {
        return Ok(parsed);
    }

    LEGACY_FALLBACK
        .iter()
        .find(|(alias, _)| *alias == version)
        .map(|(_, resolved)| *resolved)
        .ok_or_else(|| ConfigError::UnknownVersion(version.to_string()))
}

impl fmt::Display for KafkaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, very_minor, patch] = self.0;
        if major == 0 {
            write!(f, "0.{minor}.{very_minor}.{patch}")
        } else {
            write!(f, "{major}.{minor}.{very_minor}")
        }
    }
}

impl FromStr for KafkaVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        resolve_version(s)
    }
}

impl Serialize for KafkaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KafkaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        resolve_version(&raw).map_err(serde::de::Error::custom)
    }
}

/// API versions the transport sends for each request it issues.
///
/// Only non-flexible versions are chosen for the metadata-style requests;
/// they cover every release the fallback table knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestVersions {
    pub metadata: i16,
    pub list_offsets: i16,
    pub find_coordinator: i16,
    pub list_groups: i16,
    pub sasl_handshake: i16,
    pub sasl_authenticate: i16,
}

impl RequestVersions {
    /// Pick request versions supported by `version`.
    #[must_use]
    pub fn for_version(version: KafkaVersion) -> Self {
        let pick = |table: &[(KafkaVersion, i16)]| {
            table
                .iter()
                .find(|(since, _)| version.is_at_least(*since))
                .map_or(0, |(_, api)| *api)
        };

        Self {
            metadata: pick(&[
                (KafkaVersion::V1_0_0_0, 5),
                (KafkaVersion::V0_11_0_0, 4),
                (KafkaVersion::V0_10_1_0, 2),
                (KafkaVersion::V0_10_0_0, 1),
            ]),
            list_offsets: pick(&[
                (KafkaVersion::V0_11_0_0, 2),
                (KafkaVersion::V0_10_1_0, 1),
            ]),
            find_coordinator: pick(&[
                (KafkaVersion::V2_0_0_0, 2),
                (KafkaVersion::V0_11_0_0, 1),
            ]),
            list_groups: pick(&[
                (KafkaVersion::V2_0_0_0, 2),
                (KafkaVersion::V0_11_0_0, 1),
            ]),
            sasl_handshake: pick(&[(KafkaVersion::V1_0_0_0, 1)]),
            sasl_authenticate: pick(&[
                (KafkaVersion::V2_2_0_0, 2),
                (KafkaVersion::V2_0_0_0, 1),
            ]),
        }
    }

    /// Whether SASL tokens travel inside `SaslAuthenticate` requests
    /// (handshake v1) rather than as raw frames (handshake v0).
    #[must_use]
    pub fn framed_sasl(&self) -> bool {
        self.sasl_handshake >= 1
    }
}
