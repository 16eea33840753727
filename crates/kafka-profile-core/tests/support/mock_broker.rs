//! Mock Kafka broker for integration testing.
//!
//! A lightweight mock broker that:
//! - Accepts Kafka protocol connections
//! - Records all requests received
//! - Answers with responses produced by per-API handlers

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::RequestHeader;
use kafka_protocol::protocol::{Decodable, HeaderVersion, Request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, RwLock};

/// API keys the client under test sends.
pub mod api_keys {
    pub const LIST_OFFSETS: i16 = 2;
    pub const METADATA: i16 = 3;
    pub const FIND_COORDINATOR: i16 = 10;
    pub const LIST_GROUPS: i16 = 16;
    pub const SASL_HANDSHAKE: i16 = 17;
    pub const SASL_AUTHENTICATE: i16 = 36;
}

/// A recorded broker call.
#[derive(Debug, Clone)]
pub struct BrokerCall {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    /// The raw request bytes (header included, length prefix stripped).
    pub request_bytes: Bytes,
}

impl BrokerCall {
    /// Decode the request body this call carried.
    pub fn request<R: Request>(&self) -> R {
        let mut buf = self.request_bytes.clone();
        RequestHeader::decode(&mut buf, R::header_version(self.api_version))
            .expect("request header decodes");
        R::decode(&mut buf, self.api_version).expect("request body decodes")
    }
}

/// Response generator function type.
pub type ResponseGenerator = Arc<dyn Fn(&BrokerCall) -> Bytes + Send + Sync>;

/// Mock Kafka broker for testing.
pub struct MockBroker {
    address: String,
    shutdown_tx: Option<broadcast::Sender<()>>,
    call_log: Arc<RwLock<Vec<BrokerCall>>>,
    response_handlers: Arc<RwLock<HashMap<i16, ResponseGenerator>>>,
}

impl MockBroker {
    /// A broker that will bind to an ephemeral local port.
    pub fn new() -> Self {
        Self {
            address: "127.0.0.1:0".to_string(),
            shutdown_tx: None,
            call_log: Arc::new(RwLock::new(Vec::new())),
            response_handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start accepting connections. Returns the address actually bound.
    pub async fn start(&mut self) -> std::io::Result<String> {
        let listener = TcpListener::bind(&self.address).await?;
        self.address = listener.local_addr()?.to_string();

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        let call_log = self.call_log.clone();
        let response_handlers = self.response_handlers.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let call_log = call_log.clone();
                        let response_handlers = response_handlers.clone();
                        let shutdown_rx = shutdown_tx.subscribe();

                        tokio::spawn(async move {
                            Self::handle_connection(stream, call_log, response_handlers, shutdown_rx).await;
                        });
                    }
                }
            }
        });

        Ok(self.address.clone())
    }

    /// Stop the broker and drop every open connection.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    pub async fn register_handler(&self, api_key: i16, handler: ResponseGenerator) {
        self.response_handlers.write().await.insert(api_key, handler);
    }

    pub async fn get_calls(&self) -> Vec<BrokerCall> {
        self.call_log.read().await.clone()
    }

    pub async fn get_calls_for_api(&self, api_key: i16) -> Vec<BrokerCall> {
        self.call_log
            .read()
            .await
            .iter()
            .filter(|c| c.api_key == api_key)
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.call_log.write().await.clear();
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> i32 {
        self.address
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(0)
    }

    async fn handle_connection(
        mut stream: TcpStream,
        call_log: Arc<RwLock<Vec<BrokerCall>>>,
        response_handlers: Arc<RwLock<HashMap<i16, ResponseGenerator>>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = Self::read_frame(&mut stream) => {
                    let Ok(Some(frame)) = result else { break };
                    if frame.len() < 8 {
                        continue;
                    }

                    let call = BrokerCall {
                        api_key: i16::from_be_bytes([frame[0], frame[1]]),
                        api_version: i16::from_be_bytes([frame[2], frame[3]]),
                        correlation_id: i32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]),
                        request_bytes: Bytes::from(frame),
                    };
                    call_log.write().await.push(call.clone());

                    let response = {
                        let handlers = response_handlers.read().await;
                        match handlers.get(&call.api_key) {
                            Some(handler) => handler(&call),
                            None => Self::default_response(&call),
                        }
                    };

                    if Self::write_frame(&mut stream, &response).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Read a Kafka frame (4-byte length prefix + body).
    async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;
        Ok(Some(buf))
    }

    async fn write_frame(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
        let mut buf = BytesMut::with_capacity(4 + data.len());
        buf.put_u32(data.len() as u32);
        buf.extend_from_slice(data);
        stream.write_all(&buf).await?;
        stream.flush().await
    }

    /// Correlation ID only.
    fn default_response(call: &BrokerCall) -> Bytes {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_i32(call.correlation_id);
        buf.freeze()
    }
}

impl Drop for MockBroker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Response builders on top of the `kafka-protocol` message types.
pub mod responses {
    use kafka_protocol::messages::metadata_response::{
        MetadataResponseBroker, MetadataResponsePartition, MetadataResponseTopic,
    };
    use kafka_protocol::messages::{BrokerId, MetadataResponse, ResponseHeader, TopicName};
    use kafka_protocol::protocol::{Encodable, StrBytes};

    use super::*;

    /// Encode `response` with a header echoing the call's correlation ID,
    /// at the version the call was made with.
    pub fn encode<R: Encodable + HeaderVersion>(call: &BrokerCall, response: &R) -> Bytes {
        let mut buf = BytesMut::new();
        let mut header = ResponseHeader::default();
        header.correlation_id = call.correlation_id;
        header
            .encode(&mut buf, R::header_version(call.api_version))
            .expect("response header encodes");
        response
            .encode(&mut buf, call.api_version)
            .expect("response body encodes");
        buf.freeze()
    }

    /// Topic entry with one partition per leader; `-1` means no leader.
    pub fn metadata_topic(name: &str, leaders: &[i32], replicas: &[i32]) -> MetadataResponseTopic {
        let mut topic = MetadataResponseTopic::default();
        topic.name = Some(TopicName::from(StrBytes::from_string(name.to_string())));
        for (index, leader) in leaders.iter().enumerate() {
            let mut partition = MetadataResponsePartition::default();
            partition.partition_index = index as i32;
            partition.leader_id = BrokerId(*leader);
            partition.replica_nodes = replicas.iter().copied().map(BrokerId).collect();
            partition.isr_nodes = if *leader >= 0 {
                vec![BrokerId(*leader)]
            } else {
                Vec::new()
            };
            topic.partitions.push(partition);
        }
        topic
    }

    /// Topic entry carrying only an error code.
    pub fn metadata_topic_error(name: &str, error_code: i16) -> MetadataResponseTopic {
        let mut topic = MetadataResponseTopic::default();
        topic.name = Some(TopicName::from(StrBytes::from_string(name.to_string())));
        topic.error_code = error_code;
        topic
    }

    /// Metadata listing a single broker.
    pub fn metadata(
        broker_id: i32,
        host: &str,
        port: i32,
        topics: Vec<MetadataResponseTopic>,
    ) -> MetadataResponse {
        let mut broker = MetadataResponseBroker::default();
        broker.node_id = BrokerId(broker_id);
        broker.host = StrBytes::from_string(host.to_string());
        broker.port = port;

        let mut response = MetadataResponse::default();
        response.brokers.push(broker);
        response.topics = topics;
        response
    }
}
