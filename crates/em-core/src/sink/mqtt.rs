//! MQTT transport for [`PublishSink`](super::PublishSink), backed by `rumqttc`.
//!
//! Each connection runs the client event loop on its own thread. `connect`
//! returns once the broker acknowledges the session, or with the first
//! connection error.

use em_common::{Error, Result};
use rumqttc::{Client, Event, MqttOptions, Packet};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::publish::{BrokerClient, BrokerConnector, ConnectOptions, QoS};

const REQUEST_CAPACITY: usize = 64;
const MAX_PACKET_BYTES: usize = 1024 * 1024;

/// Connects publish sinks to a real MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    keep_alive: Duration,
    connect_timeout: Duration,
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl MqttConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn mqtt_options(&self, options: &ConnectOptions) -> MqttOptions {
        let mut mqtt = MqttOptions::new(
            options.client_id.clone(),
            options.host.clone(),
            options.port,
        );
        mqtt.set_keep_alive(self.keep_alive)
            .set_clean_session(options.clean_session)
            .set_max_packet_size(MAX_PACKET_BYTES, MAX_PACKET_BYTES);
        mqtt
    }
}

impl BrokerConnector for MqttConnector {
    fn connect(&mut self, options: &ConnectOptions) -> Result<Box<dyn BrokerClient>> {
        let mqtt = self.mqtt_options(options);
        let broker = options.broker_url.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<Client, String>>();

        thread::Builder::new()
            .name(format!("mqtt-{}", options.client_id))
            .spawn(move || run_event_loop(mqtt, broker, ready_tx))
            .map_err(|e| Error::Broker(format!("failed to start MQTT event loop: {}", e)))?;

        match ready_rx.recv_timeout(self.connect_timeout) {
            Ok(Ok(client)) => Ok(Box::new(MqttClient { client })),
            Ok(Err(reason)) => Err(Error::Broker(reason)),
            Err(_) => Err(Error::Broker(format!(
                "no acknowledgement from {} within {:?}",
                options.broker_url, self.connect_timeout
            ))),
        }
    }
}

/// Drive the connection until it fails or every client handle is dropped.
fn run_event_loop(
    mqtt: MqttOptions,
    broker: String,
    ready: mpsc::Sender<std::result::Result<Client, String>>,
) {
    let (client, mut connection) = Client::new(mqtt, REQUEST_CAPACITY);
    let mut pending = Some((client, ready));

    for event in connection.iter() {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if let Some((client, ready)) = pending.take() {
                    // The caller may have timed out; the client then drops here.
                    let _ = ready.send(Ok(client));
                }
            }
            Ok(_) => {}
            Err(e) => {
                match pending.take() {
                    Some((_, ready)) => {
                        let _ = ready.send(Err(format!("connection to {} failed: {}", broker, e)));
                    }
                    None => debug!(%broker, error = %e, "MQTT event loop finished"),
                }
                break;
            }
        }
    }
}

struct MqttClient {
    client: Client,
}

impl BrokerClient for MqttClient {
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<()> {
        self.client
            .publish(topic, to_mqtt_qos(qos), false, payload.to_vec())
            .map_err(|e| Error::Broker(format!("publish to {} failed: {}", topic, e)))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.client.disconnect().map_err(|e| {
            warn!(error = %e, "MQTT disconnect request failed");
            Error::Broker(format!("disconnect failed: {}", e))
        })
    }
}

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}
