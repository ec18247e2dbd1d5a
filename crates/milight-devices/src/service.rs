//! Bridge service - the single event loop tying transport, discovery,
//! translation and the host registry together.
//!
//! [`BridgeService::run`] processes one transport event, host request or
//! heartbeat at a time, so the discovery map needs no locking. Per-message
//! failures are logged and dropped; nothing here stops the loop except the
//! shutdown signal or a closed transport channel.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::adapter::{HostRequest, Transport, TransportError, TransportEvent};
use crate::classifier::CapabilityProfile;
use crate::config::BridgeSettings;
use crate::discovery::{DiscoveryOrchestrator, Resolution};
use crate::mdl::{DeviceHandle, DeviceIdentity, DeviceKind, DeviceRecord, SwitchKind};
use crate::registry::DeviceRegistry;
use crate::translator::{
    apply_inbound, build_outbound, resolve_brightness_step, Command, StateMessage, TranslateError,
};

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Topic is on the ignore list
    Ignored,
    /// Topic does not match the state pattern or lacks an identity field
    TopicMismatch,
    /// Payload is not a valid state report
    Malformed,
    /// Device type cannot be driven
    Unsupported,
    /// A record was created from the report
    Created(DeviceHandle),
    /// An existing record was updated
    Updated(DeviceHandle),
    /// The registry rejected the request
    Failed,
}

/// What happened to a host command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Payload handed to the transport
    Published { topic: String, payload: String },
    /// Command maps to an empty payload; nothing was sent
    NoOp,
    /// No record for the handle
    UnknownDevice,
    Rejected(TranslateError),
    Failed(TransportError),
}

/// Bridge between a hub transport and a host registry.
pub struct BridgeService<R: ?Sized, T: ?Sized> {
    registry: Arc<R>,
    transport: Arc<T>,
    settings: BridgeSettings,
    discovery: DiscoveryOrchestrator,
}

impl<R, T> BridgeService<R, T>
where
    R: DeviceRegistry + ?Sized,
    T: Transport + ?Sized,
{
    pub fn new(registry: Arc<R>, transport: Arc<T>, settings: BridgeSettings) -> Self {
        let discovery = DiscoveryOrchestrator::new(settings.options.add_discovered_device_used);
        Self {
            registry,
            transport,
            settings,
            discovery,
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn discovery(&self) -> &DiscoveryOrchestrator {
        &self.discovery
    }

    /// Topic filters to subscribe to after every (re)connect.
    pub fn subscription_filters(&self) -> Vec<String> {
        vec![self.settings.state_topic.subscription_filter()]
    }

    /// Run until `shutdown` resolves or the transport channel closes.
    pub async fn run<S>(
        mut self,
        mut events: mpsc::Receiver<TransportEvent>,
        mut requests: mpsc::Receiver<HostRequest>,
        shutdown: S,
    ) where
        S: Future<Output = ()>,
    {
        let mut heartbeat = interval(self.settings.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut requests_open = true;
        info!(
            "Bridge running, state topic '{}', command topic '{}'",
            self.settings.state_topic, self.settings.command_topic
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        warn!("Transport event channel closed");
                        break;
                    }
                },
                request = requests.recv(), if requests_open => match request {
                    Some(request) => self.handle_request(request).await,
                    None => {
                        debug!("Host request channel closed");
                        requests_open = false;
                    }
                },
                _ = heartbeat.tick() => self.heartbeat().await,
            }
        }
    }

    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                info!("Connected to MQTT broker");
                let filters = self.subscription_filters();
                debug!("Subscribing to {:?}", filters);
                if let Err(e) = self.transport.subscribe(&filters).await {
                    error!("Subscription failed: {}", e);
                }
            }
            TransportEvent::Disconnected => warn!("Disconnected from MQTT broker"),
            TransportEvent::Subscribed => debug!("Subscribed"),
            TransportEvent::Message { topic, payload } => {
                self.handle_message(&topic, &payload).await;
            }
        }
    }

    pub async fn handle_request(&mut self, request: HostRequest) {
        match request {
            HostRequest::Command {
                handle,
                command,
                level,
                color,
            } => {
                self.handle_command(handle, &command, level, color.as_deref())
                    .await;
            }
            HostRequest::DeviceModified(handle) => {
                self.on_device_modified(handle).await;
            }
            HostRequest::DeviceRemoved(handle) => self.on_device_removed(handle),
        }
    }

    /// Process one inbound publish.
    pub async fn handle_message(&mut self, topic: &str, payload: &[u8]) -> MessageOutcome {
        if self.settings.debug.dumps_messages() {
            debug!("{}:{}", topic, String::from_utf8_lossy(payload));
        }

        if self.settings.ignored_topics.contains(topic) {
            debug!(topic = %topic, "Ignored topic");
            return MessageOutcome::Ignored;
        }

        let Some(found) = self.settings.state_topic.matches(topic) else {
            debug!(topic = %topic, "Topic does not match state pattern");
            return MessageOutcome::TopicMismatch;
        };
        let identity = match found.identity() {
            Ok(identity) => identity,
            Err(e) => {
                debug!(topic = %topic, "No device identity: {}", e);
                return MessageOutcome::TopicMismatch;
            }
        };

        let message = match StateMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(topic = %topic, "Dropping message: {}", e);
                return MessageOutcome::Malformed;
            }
        };

        let record = match self.locate(topic, &identity, &message).await {
            Located::Record(record) => record,
            Located::Done(outcome) => return outcome,
        };

        info!(
            "{}/{}: State change: '{}'",
            record.handle,
            record.name,
            String::from_utf8_lossy(payload)
        );

        let update = apply_inbound(&profile_of(&record), &record.state, &message);
        match self.registry.update(record.handle, &update).await {
            Ok(()) => MessageOutcome::Updated(record.handle),
            Err(e) => {
                warn!(topic = %topic, unit = record.handle.0, "Update failed: {}", e);
                MessageOutcome::Failed
            }
        }
    }

    /// Resolve a topic to the record to update, or to a final outcome.
    async fn locate(
        &mut self,
        topic: &str,
        identity: &DeviceIdentity,
        message: &StateMessage,
    ) -> Located {
        // A mapped handle whose record vanished is forgotten and resolved once more.
        for _ in 0..2 {
            let handle = match self
                .discovery
                .resolve(self.registry.as_ref(), topic, identity, message)
                .await
            {
                Resolution::Known(handle) | Resolution::Adopted(handle) => handle,
                Resolution::Created(record) => {
                    return Located::Done(MessageOutcome::Created(record.handle))
                }
                Resolution::Unsupported => return Located::Done(MessageOutcome::Unsupported),
                Resolution::Failed(_) => return Located::Done(MessageOutcome::Failed),
            };

            match self.registry.get(handle).await {
                Ok(Some(record)) => return Located::Record(record),
                Ok(None) => {
                    warn!(topic = %topic, unit = handle.0, "Device record is gone");
                    self.discovery.forget_handle(handle);
                }
                Err(e) => {
                    warn!(topic = %topic, unit = handle.0, "Device lookup failed: {}", e);
                    return Located::Done(MessageOutcome::Failed);
                }
            }
        }

        Located::Done(MessageOutcome::Failed)
    }

    /// Translate a host command and publish it on the device's command topic.
    pub async fn handle_command(
        &mut self,
        handle: DeviceHandle,
        command: &str,
        level: u8,
        color: Option<&str>,
    ) -> CommandOutcome {
        let record = match self.registry.get(handle).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(unit = handle.0, "Command '{}' for unknown device", command);
                return CommandOutcome::UnknownDevice;
            }
            Err(e) => {
                warn!(unit = handle.0, "Device lookup failed: {}", e);
                return CommandOutcome::UnknownDevice;
            }
        };

        info!(
            "{}/{}: Command: '{}', Level: {}, Color: {}",
            handle,
            record.name,
            command,
            level,
            color.unwrap_or("")
        );

        let parsed: Command = match command.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(unit = handle.0, "{}", e);
                return CommandOutcome::Rejected(e);
            }
        };

        let last_level = record.state.level.percent().unwrap_or(0);
        let (parsed, level) = resolve_brightness_step(parsed, level.min(100), last_level);

        let payload = match build_outbound(&profile_of(&record), parsed, level, color) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(unit = handle.0, "Command '{}' rejected: {}", command, e);
                return CommandOutcome::Rejected(e);
            }
        };

        if payload.is_empty() {
            debug!(unit = handle.0, "Command '{}' has nothing to send", command);
            return CommandOutcome::NoOp;
        }

        let json = match payload.to_json() {
            Ok(json) => json,
            Err(e) => return CommandOutcome::Rejected(e),
        };
        let topic = self.settings.command_topic.render(&record.identity);

        debug!("Publishing '{}' to '{}'", json, topic);
        match self.transport.publish(&topic, json.clone().into_bytes()).await {
            Ok(()) => CommandOutcome::Published {
                topic,
                payload: json,
            },
            Err(e) => {
                warn!(unit = handle.0, "Command not sent: {}", e);
                CommandOutcome::Failed(e)
            }
        }
    }

    /// Re-type a record whose display name carries a kind tag.
    ///
    /// Returns the new kind when the record was changed.
    pub async fn on_device_modified(&mut self, handle: DeviceHandle) -> Option<DeviceKind> {
        let record = match self.registry.get(handle).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                error!(unit = handle.0, "onDeviceModified: {}", e);
                return None;
            }
        };

        let kind = DeviceKind::from_name_tag(&record.name)?;
        if kind == record.kind {
            return None;
        }

        match self.registry.retype(handle, kind).await {
            Ok(()) => {
                info!("{}/{}: Type changed {} -> {}", handle, record.name, record.kind, kind);
                Some(kind)
            }
            Err(e) => {
                error!(unit = handle.0, "onDeviceModified: {}", e);
                None
            }
        }
    }

    pub fn on_device_removed(&mut self, handle: DeviceHandle) {
        let dropped = self.discovery.forget_handle(handle);
        info!(unit = handle.0, "Device {} removed, {} topic(s) forgotten", handle, dropped);
    }

    /// Periodic liveness check.
    pub async fn heartbeat(&self) {
        if self.settings.debug.dumps_messages() {
            debug!("Heartbeating...");
        }

        if !self.transport.is_connected() {
            debug!("Reconnecting");
            if let Err(e) = self.transport.reconnect().await {
                warn!("Reconnect failed: {}", e);
            }
        }
    }
}

enum Located {
    Record(DeviceRecord),
    Done(MessageOutcome),
}

fn profile_of(record: &DeviceRecord) -> CapabilityProfile {
    if record.switch_kind == SwitchKind::Unsupported {
        CapabilityProfile::UNSUPPORTED
    } else {
        record.kind.profile()
    }
}
