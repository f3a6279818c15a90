//! Broker publish sink: one message per closed batch on `metrics-<application>`.
//!
//! The transport client is supplied through [`BrokerConnector`]. Delivery
//! durability is the client's QoS guarantee; nothing is persisted locally and
//! sessions are clean, so unsent messages do not survive a reconnect.

use em_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::{MetricSink, StreamKey};

const SINK_KIND: &str = "publish";
const TOPIC_PREFIX: &str = "metrics-";

/// Broker delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    pub fn level(self) -> u8 {
        self as u8
    }
}

/// Connection parameters for one reporter stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub broker_url: String,
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub clean_session: bool,
}

/// A connected broker client.
pub trait BrokerClient: Send {
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
}

/// Creates broker clients.
pub trait BrokerConnector: Send {
    fn connect(&mut self, options: &ConnectOptions) -> Result<Box<dyn BrokerClient>>;
}

struct Connection {
    client: Box<dyn BrokerClient>,
    topic: String,
}

/// Publish sink.
pub struct PublishSink {
    host: String,
    port: u16,
    qos: QoS,
    connector: Box<dyn BrokerConnector>,
    connection: Option<Connection>,
}

impl std::fmt::Debug for PublishSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishSink")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("qos", &self.qos)
            .field("topic", &self.topic())
            .finish()
    }
}

impl PublishSink {
    pub fn new(host: impl Into<String>, port: u16, connector: Box<dyn BrokerConnector>) -> Self {
        Self {
            host: host.into(),
            port,
            qos: QoS::ExactlyOnce,
            connector,
            connection: None,
        }
    }

    pub fn topic_for(stream: &StreamKey) -> String {
        format!("{}{}", TOPIC_PREFIX, stream.application_id)
    }

    pub fn client_id_for(stream: &StreamKey) -> String {
        format!(
            "{}-{}-{}",
            stream.application_id, stream.hostname, stream.executor_id
        )
    }

    pub fn broker_url(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    pub fn topic(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.topic.as_str())
    }
}

impl MetricSink for PublishSink {
    fn kind(&self) -> &'static str {
        SINK_KIND
    }

    fn open(&mut self, stream: &StreamKey) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        let options = ConnectOptions {
            broker_url: self.broker_url(),
            host: self.host.clone(),
            port: self.port,
            client_id: Self::client_id_for(stream),
            clean_session: true,
        };
        let client = self
            .connector
            .connect(&options)
            .map_err(|e| Error::SinkOpen {
                sink: SINK_KIND,
                reason: e.to_string(),
            })?;
        let topic = Self::topic_for(stream);
        info!(broker = %options.broker_url, client_id = %options.client_id, %topic, "connected to broker");
        self.connection = Some(Connection { client, topic });
        Ok(())
    }

    fn emit(&mut self, record: &str) -> Result<()> {
        let qos = self.qos;
        let connection = self
            .connection
            .as_mut()
            .ok_or(Error::SinkNotOpen { sink: SINK_KIND })?;
        connection
            .client
            .publish(&connection.topic, record.as_bytes(), qos)
    }

    fn sync(&mut self) -> Result<()> {
        // Acknowledgement is part of publish at this QoS.
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(mut connection) => {
                debug!(topic = %connection.topic, "disconnecting from broker");
                connection.client.disconnect()
            }
            None => Ok(()),
        }
    }
}

/// A message captured by [`InMemoryBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub client_id: String,
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
}

#[derive(Debug, Default)]
struct BrokerState {
    connections: Vec<ConnectOptions>,
    messages: Vec<PublishedMessage>,
    disconnects: usize,
    refuse_connections: usize,
    fail_publishes: usize,
}

/// In-process broker for replay dry runs and tests.
///
/// Clones share state, so a handle kept by the caller observes what the
/// sink published.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next_connections(&self, n: usize) {
        self.state().refuse_connections = n;
    }

    /// Fail the next `n` publishes.
    pub fn fail_next_publishes(&self, n: usize) {
        self.state().fail_publishes = n;
    }

    pub fn connections(&self) -> Vec<ConnectOptions> {
        self.state().connections.clone()
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.state().messages.clone()
    }

    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }
}

impl BrokerConnector for InMemoryBroker {
    fn connect(&mut self, options: &ConnectOptions) -> Result<Box<dyn BrokerClient>> {
        let mut state = self.state();
        if state.refuse_connections > 0 {
            state.refuse_connections -= 1;
            return Err(Error::Broker(format!(
                "connection to {} refused",
                options.broker_url
            )));
        }
        state.connections.push(options.clone());
        Ok(Box::new(InMemoryClient {
            client_id: options.client_id.clone(),
            broker: self.clone(),
        }))
    }
}

struct InMemoryClient {
    client_id: String,
    broker: InMemoryBroker,
}

impl BrokerClient for InMemoryClient {
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<()> {
        let mut state = self.broker.state();
        if state.fail_publishes > 0 {
            state.fail_publishes -= 1;
            return Err(Error::Broker(format!("publish to {} failed", topic)));
        }
        state.messages.push(PublishedMessage {
            client_id: self.client_id.clone(),
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            qos,
        });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.broker.state().disconnects += 1;
        Ok(())
    }
}
