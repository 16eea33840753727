//! TLS material for broker connections.
//!
//! A [`TlsDescriptor`] names the files of a `tls.<name>` settings section.
//! [`TlsProfile::load`] reads them once, at profile build time, and keeps the
//! assembled `rustls` configuration ready for every connection that uses the
//! profile.
//!
//! ```rust,ignore
//! let descriptor = TlsDescriptor {
//!     ca_file: Some("/etc/kafka/ca.pem".into()),
//!     ..TlsDescriptor::default()
//! };
//! let tls = TlsProfile::load(descriptor)?;
//! let stream = tls.connector().connect("kafka-1.example.com", tcp).await?;
//! ```

mod client;
#[cfg(test)]
pub(crate) mod fixtures;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use rustls::ClientConfig;
use tracing::debug;

use crate::error::TlsResult;

pub use client::TlsConnector;

/// Paths and flags from a `tls.<name>` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsDescriptor {
    /// Client certificate chain (`certfile`).
    pub cert_file: Option<PathBuf>,
    /// Client private key (`keyfile`).
    pub key_file: Option<PathBuf>,
    /// CA bundle (`cafile`).
    pub ca_file: Option<PathBuf>,
    /// Disable server certificate validation (`noverify`).
    pub insecure_skip_verify: bool,
}

/// Loaded TLS material plus the ready-to-use client configuration.
#[derive(Clone)]
pub struct TlsProfile {
    descriptor: TlsDescriptor,
    trust_roots: Vec<CertificateDer<'static>>,
    client_chain: Vec<CertificateDer<'static>>,
    config: Arc<ClientConfig>,
}

impl TlsProfile {
    /// Read the files named by `descriptor` and build the client config.
    ///
    /// The client certificate is only loaded when both `cert_file` and
    /// `key_file` are given. Without a CA bundle the trust roots stay empty
    /// and the webpki root set is used.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is unreadable, holds no usable PEM
    /// entries, or rustls rejects the certificate/key pair.
    pub fn load(descriptor: TlsDescriptor) -> TlsResult<Self> {
        let trust_roots = match &descriptor.ca_file {
            Some(path) => {
                debug!(path = %path.display(), "loading CA bundle");
                client::load_certificates(path)?
            }
            None => Vec::new(),
        };

        let client_auth = match (&descriptor.cert_file, &descriptor.key_file) {
            (Some(cert), Some(key)) => {
                debug!(cert = %cert.display(), "loading client certificate");
                Some((client::load_certificates(cert)?, client::load_private_key(key)?))
            }
            _ => None,
        };
        let client_chain = client_auth
            .as_ref()
            .map(|(chain, _)| chain.clone())
            .unwrap_or_default();

        let config = client::build_client_config(
            &trust_roots,
            client_auth,
            descriptor.insecure_skip_verify,
        )?;

        Ok(Self {
            descriptor,
            trust_roots,
            client_chain,
            config: Arc::new(config),
        })
    }

    pub fn descriptor(&self) -> &TlsDescriptor {
        &self.descriptor
    }

    /// Certificates from the CA bundle; empty when none was configured.
    pub fn trust_roots(&self) -> &[CertificateDer<'static>] {
        &self.trust_roots
    }

    /// The client certificate chain; empty without mutual TLS.
    pub fn client_chain(&self) -> &[CertificateDer<'static>] {
        &self.client_chain
    }

    pub fn has_client_certificate(&self) -> bool {
        !self.client_chain.is_empty()
    }

    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::new(self.client_config())
    }
}

// The rustls config is derived from the other fields.
impl PartialEq for TlsProfile {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor
            && self.trust_roots == other.trust_roots
            && self.client_chain == other.client_chain
    }
}

impl fmt::Debug for TlsProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsProfile")
            .field("descriptor", &self.descriptor)
            .field("trust_roots", &self.trust_roots.len())
            .field("client_chain", &self.client_chain.len())
            .finish_non_exhaustive()
    }
}
