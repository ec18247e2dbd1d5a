//! MQTT transport over `rumqttc`.
//!
//! The event loop runs on its own task and forwards connection changes and
//! inbound publishes as [`TransportEvent`]s. Publishes and subscriptions are
//! queued with the client's non-blocking `try_*` calls. After a connection
//! error the loop waits one second, or less when [`Transport::reconnect`]
//! nudges it, and polls again; `rumqttc` re-dials on the next poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeFilter};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

use crate::adapter::{Transport, TransportError, TransportEvent, TransportResult};
use crate::config::MqttSettings;

/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 10;
/// Capacity of the event channel towards the service.
const EVENT_CAPACITY: usize = 64;
/// Delay between reconnect attempts.
const RETRY_DELAY: Duration = Duration::from_secs(1);
/// Consecutive errors after which the loop logs at error level.
const MAX_QUIET_ERRORS: u32 = 5;

/// MQTT link to the hub's broker.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    wake: Arc<Notify>,
    broker_addr: String,
}

impl MqttTransport {
    /// Create the client and spawn its event loop. Must be called inside a
    /// Tokio runtime.
    pub fn start(settings: &MqttSettings) -> (Self, mpsc::Receiver<TransportEvent>) {
        let client_id = settings.client_id();
        let mut options = MqttOptions::new(&client_id, settings.host(), settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));
        options.set_clean_session(true);

        if let Some((user, pass)) = settings.credentials() {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);

        let transport = Self {
            client,
            connected: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
            broker_addr: settings.broker_addr(),
        };

        info!(
            category = "mqtt",
            broker = %transport.broker_addr,
            client_id = %client_id,
            "Starting MQTT client"
        );

        tokio::spawn(Self::run_eventloop(
            eventloop,
            event_tx,
            transport.connected.clone(),
            transport.wake.clone(),
            transport.broker_addr.clone(),
        ));

        (transport, event_rx)
    }

    async fn run_eventloop(
        mut eventloop: EventLoop,
        event_tx: mpsc::Sender<TransportEvent>,
        connected: Arc<AtomicBool>,
        wake: Arc<Notify>,
        broker_addr: String,
    ) {
        let mut error_count: u32 = 0;

        loop {
            let event = match eventloop.poll().await {
                Ok(notification) => {
                    error_count = 0;
                    match Self::translate(notification) {
                        Some(event) => event,
                        None => continue,
                    }
                }
                Err(e) => {
                    error_count = error_count.saturating_add(1);
                    if error_count == MAX_QUIET_ERRORS {
                        error!(
                            "MQTT broker {} unreachable after {} attempts: {}",
                            broker_addr, error_count, e
                        );
                    } else {
                        warn!("MQTT broker {} error ({}): {}", broker_addr, error_count, e);
                    }

                    let was_connected = connected.swap(false, Ordering::SeqCst);
                    if was_connected && event_tx.send(TransportEvent::Disconnected).await.is_err()
                    {
                        break;
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                        _ = wake.notified() => debug!("Reconnect requested"),
                    }
                    continue;
                }
            };

            match event {
                TransportEvent::Connected => connected.store(true, Ordering::SeqCst),
                TransportEvent::Disconnected => connected.store(false, Ordering::SeqCst),
                _ => {}
            }

            if event_tx.send(event).await.is_err() {
                break;
            }
        }

        connected.store(false, Ordering::SeqCst);
        info!("MQTT broker {} connection closed", broker_addr);
    }

    fn translate(notification: Event) -> Option<TransportEvent> {
        match notification {
            Event::Incoming(Packet::ConnAck(ack)) => {
                info!("MQTT connection acknowledged: {:?}", ack.code);
                Some(TransportEvent::Connected)
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                debug!("Subscription acknowledged: pkid {}", ack.pkid);
                Some(TransportEvent::Subscribed)
            }
            Event::Incoming(Packet::Publish(publish)) => Some(TransportEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }),
            Event::Incoming(Packet::Disconnect) => Some(TransportEvent::Disconnected),
            other => {
                trace!("MQTT event: {:?}", other);
                None
            }
        }
    }

    /// Queue a clean disconnect.
    pub fn shutdown(&self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!("MQTT disconnect not queued: {}", e);
        }
    }

    pub fn broker_addr(&self) -> &str {
        &self.broker_addr
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> TransportResult<()> {
        if !self.is_connected() {
            self.wake.notify_one();
            return Err(TransportError::Unavailable(format!(
                "not connected to {}",
                self.broker_addr
            )));
        }

        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| TransportError::Client(e.to_string()))
    }

    async fn subscribe(&self, filters: &[String]) -> TransportResult<()> {
        if filters.is_empty() {
            return Ok(());
        }

        let filters: Vec<SubscribeFilter> = filters
            .iter()
            .map(|path| SubscribeFilter::new(path.clone(), QoS::AtMostOnce))
            .collect();

        self.client
            .try_subscribe_many(filters)
            .map_err(|e| TransportError::Client(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> TransportResult<()> {
        self.wake.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish};

    #[test]
    fn test_translate_publish() {
        let publish = Publish::new(
            "milight/states/0x1/rgbw/1",
            QoS::AtMostOnce,
            br#"{"state":"ON"}"#.to_vec(),
        );
        assert_eq!(
            MqttTransport::translate(Event::Incoming(Packet::Publish(publish))),
            Some(TransportEvent::Message {
                topic: "milight/states/0x1/rgbw/1".to_string(),
                payload: br#"{"state":"ON"}"#.to_vec(),
            })
        );
    }

    #[test]
    fn test_translate_connack() {
        let ack = ConnAck::new(ConnectReturnCode::Success, false);
        assert_eq!(
            MqttTransport::translate(Event::Incoming(Packet::ConnAck(ack))),
            Some(TransportEvent::Connected)
        );
        assert_eq!(
            MqttTransport::translate(Event::Incoming(Packet::PingResp)),
            None
        );
    }

    #[tokio::test]
    async fn test_publish_while_disconnected() {
        let settings = MqttSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        };
        let (transport, _events) = MqttTransport::start(&settings);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.publish("milight/0x1/rgbw/1", b"{}".to_vec()).await,
            Err(TransportError::Unavailable(_))
        ));
    }
}
