//! Single Kafka broker connection.
//!
//! One TCP (optionally TLS) stream per broker, opened with the profile's
//! dial timeout, authenticated once, then used for request/response pairs
//! matched by correlation ID.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::{
    RequestHeader, ResponseHeader, SaslAuthenticateRequest, SaslHandshakeRequest,
};
use kafka_protocol::protocol::{Decodable, Encodable, HeaderVersion, Request, StrBytes};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;

use crate::auth::scram::{oauthbearer_initial_response, ScramClient, ScramHash, ScramSha256, ScramSha512};
use crate::auth::{AuthConfig, ScramMechanism, TokenProvider};
use crate::error::{TransportError, TransportResult};
use crate::logging::TransportLogger;
use crate::profile::ClientProfile;
use crate::version::RequestVersions;

/// Plain TCP or TLS, behind one reader/writer.
enum WireStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for WireStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for WireStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A connection to a single Kafka broker.
pub struct BrokerConnection {
    broker_id: i32,
    host: String,
    port: i32,
    profile: Arc<ClientProfile>,
    versions: RequestVersions,
    token_provider: Option<Arc<dyn TokenProvider>>,
    logger: TransportLogger,
    stream: Mutex<Option<WireStream>>,
    correlation_id: AtomicI32,
}

impl BrokerConnection {
    /// Create a connection handle. Nothing is dialed until [`connect`].
    ///
    /// [`connect`]: BrokerConnection::connect
    pub fn new(
        broker_id: i32,
        host: impl Into<String>,
        port: i32,
        profile: Arc<ClientProfile>,
        token_provider: Option<Arc<dyn TokenProvider>>,
        logger: TransportLogger,
    ) -> Self {
        let versions = profile.version.request_versions();
        Self {
            broker_id,
            host: host.into(),
            port,
            profile,
            versions,
            token_provider,
            logger,
            stream: Mutex::new(None),
            correlation_id: AtomicI32::new(0),
        }
    }

    #[must_use]
    pub fn broker_id(&self) -> i32 {
        self.broker_id
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> i32 {
        self.port
    }

    /// `host:port`, with IPv6 literals bracketed.
    #[must_use]
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Request API versions picked for the profile's Kafka version.
    #[must_use]
    pub fn versions(&self) -> RequestVersions {
        self.versions
    }

    pub async fn is_connected(&self) -> bool {
        self.stream.lock().await.is_some()
    }

    fn next_correlation_id(&self) -> i32 {
        self.correlation_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Dial, handshake and authenticate. A no-op when already connected.
    ///
    /// # Errors
    ///
    /// Returns an error if dialing times out or fails, the TLS handshake
    /// fails, or SASL authentication is rejected.
    pub async fn connect(&self) -> TransportResult<()> {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let address = self.address();
        self.logger.log(format_args!("dialing broker {} at {address}", self.broker_id));

        let tcp = match timeout(self.profile.dial_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.logger.log(format_args!(
                    "failed to connect to broker {} at {address}: {e}",
                    self.broker_id
                ));
                return Err(TransportError::Io(e));
            }
            Err(_) => {
                self.logger.log(format_args!(
                    "timed out dialing broker {} at {address}",
                    self.broker_id
                ));
                return Err(TransportError::DialTimeout {
                    broker_id: self.broker_id,
                    address,
                });
            }
        };
        // Requests are small and latency bound.
        tcp.set_nodelay(true)?;

        let mut stream = match &self.profile.tls {
            Some(tls) => {
                let tls_stream = tls.connector().connect(&self.host, tcp).await?;
                self.logger.log(format_args!("TLS handshake with {address} completed"));
                WireStream::Tls(Box::new(tls_stream))
            }
            None => WireStream::Plain(tcp),
        };

        if self.profile.auth.is_sasl() {
            self.authenticate(&mut stream).await?;
        }

        *guard = Some(stream);
        self.logger.log(format_args!("connected to broker {} at {address}", self.broker_id));
        Ok(())
    }

    /// Drop the stream. The next request reconnects.
    pub async fn disconnect(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            let _ = stream.shutdown().await;
            self.logger.log(format_args!("closed connection to broker {}", self.broker_id));
        }
    }

    /// Send `request` at `version` and wait for its response, connecting
    /// first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, read timeout, encode/decode
    /// failure or a correlation ID mismatch. Every failure after the request
    /// is encoded drops the stream, as does dropping the returned future
    /// before it completes; the next request reconnects.
    pub async fn send<R>(&self, request: &R, version: i16) -> TransportResult<R::Response>
    where
        R: Request,
    {
        self.connect().await?;

        let mut guard = self.stream.lock().await;
        // Held outside the slot until the exchange completes, so a cancelled
        // caller cannot leave an unread response behind.
        let mut stream = guard.take().ok_or(TransportError::NotConnected {
            broker_id: self.broker_id,
        })?;

        let result = self.round_trip(&mut stream, request, version).await;
        match &result {
            Ok(_) | Err(TransportError::Encode { .. }) => *guard = Some(stream),
            Err(e) => {
                self.logger.log(format_args!(
                    "dropping connection to broker {} after error: {e}",
                    self.broker_id
                ));
            }
        }
        result
    }

    async fn round_trip<R>(&self, stream: &mut WireStream, request: &R, version: i16) -> TransportResult<R::Response>
    where
        R: Request,
    {
        let correlation_id = self.next_correlation_id();

        let mut header = RequestHeader::default();
        header.request_api_key = R::KEY;
        header.request_api_version = version;
        header.correlation_id = correlation_id;
        header.client_id = Some(StrBytes::from_string(self.profile.client_id.clone()));

        let mut buf = BytesMut::new();
        header
            .encode(&mut buf, R::header_version(version))
            .map_err(|e| TransportError::Encode {
                message: format!("request header (api key {}): {e}", R::KEY),
            })?;
        request
            .encode(&mut buf, version)
            .map_err(|e| TransportError::Encode {
                message: format!("request body (api key {} v{version}): {e}", R::KEY),
            })?;

        self.logger.log(format_args!(
            "broker {} <- api key {} v{version} correlation {correlation_id} ({} bytes)",
            self.broker_id,
            R::KEY,
            buf.len()
        ));

        let mut response = self.exchange_frame(stream, &buf).await?;

        let response_header = ResponseHeader::decode(
            &mut response,
            <R::Response as HeaderVersion>::header_version(version),
        )
        .map_err(|e| TransportError::Decode {
            message: format!("response header: {e}"),
        })?;
        if response_header.correlation_id != correlation_id {
            return Err(TransportError::CorrelationIdMismatch {
                expected: correlation_id,
                actual: response_header.correlation_id,
            });
        }

        self.logger.log(format_args!(
            "broker {} -> correlation {correlation_id} ({} bytes)",
            self.broker_id,
            response.len()
        ));

        R::Response::decode(&mut response, version).map_err(|e| TransportError::Decode {
            message: format!("response body (api key {} v{version}): {e}", R::KEY),
        })
    }

    /// Write one length-prefixed frame and read one back.
    async fn exchange_frame(&self, stream: &mut WireStream, payload: &[u8]) -> TransportResult<Bytes> {
        let mut write_buf = BytesMut::with_capacity(4 + payload.len());
        write_buf.put_u32(payload.len() as u32);
        write_buf.extend_from_slice(payload);

        stream.write_all(&write_buf).await?;
        stream.flush().await?;

        let read = timeout(self.profile.read_timeout, async {
            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await?;
            let response_len = u32::from_be_bytes(len_buf) as usize;

            let mut response_buf = vec![0u8; response_len];
            stream.read_exact(&mut response_buf).await?;
            Ok::<_, io::Error>(response_buf)
        })
        .await;

        match read {
            Ok(Ok(buf)) => Ok(Bytes::from(buf)),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::ReadTimeout {
                broker_id: self.broker_id,
            }),
        }
    }

    fn auth_error(&self, message: impl Into<String>) -> TransportError {
        TransportError::Authentication {
            broker_id: self.broker_id,
            message: message.into(),
        }
    }

    async fn authenticate(&self, stream: &mut WireStream) -> TransportResult<()> {
        let auth = &self.profile.auth;
        let Some(mechanism) = auth.mechanism() else {
            return Ok(());
        };

        if auth.handshake_first() {
            let mut request = SaslHandshakeRequest::default();
            request.mechanism = StrBytes::from_static_str(mechanism.as_str());

            let response = self
                .round_trip(stream, &request, self.versions.sasl_handshake)
                .await?;
            if response.error_code != 0 {
                let supported: Vec<String> =
                    response.mechanisms.iter().map(|m| m.to_string()).collect();
                return Err(self.auth_error(format!(
                    "SASL handshake for {mechanism} failed with error code {} (broker supports {supported:?})",
                    response.error_code
                )));
            }
            self.logger.log(format_args!(
                "SASL handshake with broker {} accepted {mechanism}",
                self.broker_id
            ));
        }

        match auth {
            AuthConfig::None => Ok(()),
            AuthConfig::Scram {
                mechanism: ScramMechanism::Sha256,
                username,
                password,
                ..
            } => self.authenticate_scram::<ScramSha256>(stream, username, password).await,
            AuthConfig::Scram {
                mechanism: ScramMechanism::Sha512,
                username,
                password,
                ..
            } => self.authenticate_scram::<ScramSha512>(stream, username, password).await,
            AuthConfig::AwsIam(identity) => {
                let provider = self
                    .token_provider
                    .as_ref()
                    .ok_or_else(|| TransportError::MissingTokenProvider(self.profile.name.clone()))?;
                let token = provider.token(identity).await?;
                self.sasl_step(stream, &oauthbearer_initial_response(&token))
                    .await?;
                self.logger.log(format_args!(
                    "SASL {mechanism} authentication with broker {} succeeded",
                    self.broker_id
                ));
                Ok(())
            }
        }
    }

    async fn authenticate_scram<H: ScramHash>(
        &self,
        stream: &mut WireStream,
        username: &str,
        password: &str,
    ) -> TransportResult<()> {
        let mut scram = ScramClient::<H>::new(username, password);

        let server_first = self.sasl_step(stream, scram.client_first().as_bytes()).await?;
        let server_first = String::from_utf8(server_first)
            .map_err(|_| self.auth_error("invalid UTF-8 in server-first-message"))?;

        let client_final = scram.client_final(&server_first).map_err(|e| self.auth_error(e))?;

        let server_final = self.sasl_step(stream, client_final.as_bytes()).await?;
        let server_final = String::from_utf8(server_final)
            .map_err(|_| self.auth_error("invalid UTF-8 in server-final-message"))?;

        scram
            .verify_server_final(&server_final)
            .map_err(|e| self.auth_error(e))?;

        self.logger.log(format_args!(
            "SASL {} authentication with broker {} succeeded",
            H::name(),
            self.broker_id
        ));
        Ok(())
    }

    /// Send one SASL token and return the broker's answer. Kafka 1.0 and
    /// later wrap tokens in SaslAuthenticate; older brokers take raw frames.
    async fn sasl_step(&self, stream: &mut WireStream, token: &[u8]) -> TransportResult<Vec<u8>> {
        if !self.versions.framed_sasl() {
            let response = self.exchange_frame(stream, token).await?;
            return Ok(response.to_vec());
        }

        let mut request = SaslAuthenticateRequest::default();
        request.auth_bytes = Bytes::copy_from_slice(token);

        let response = self
            .round_trip(stream, &request, self.versions.sasl_authenticate)
            .await?;
        if response.error_code != 0 {
            let message = response
                .error_message
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(self.auth_error(format!(
                "error code {}: {message}",
                response.error_code
            )));
        }
        Ok(response.auth_bytes.to_vec())
    }
}

impl std::fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("broker_id", &self.broker_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}
