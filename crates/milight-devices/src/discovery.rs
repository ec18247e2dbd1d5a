//! Device discovery from inbound state reports.
//!
//! Each state topic is either unseen or registered. The first supported
//! report on an unseen topic creates a registry record, or adopts one that
//! already carries the same identity, and records `topic -> handle`.
//! Later reports on the topic resolve through that map without touching
//! the registry.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::classifier::classify;
use crate::mdl::{DeviceHandle, DeviceIdentity, DeviceKind, DeviceRecord, DeviceState};
use crate::registry::{CreateDevice, DeviceRegistry, RegistryError};
use crate::translator::{apply_inbound, StateMessage};

/// Outcome of resolving a state topic to a registry record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Topic was already registered
    Known(DeviceHandle),
    /// An existing record with the same identity was found
    Adopted(DeviceHandle),
    /// A new record was created with the report applied
    Created(DeviceRecord),
    /// The device type cannot be driven; nothing was recorded
    Unsupported,
    /// The registry refused the request; the topic stays unseen
    Failed(RegistryError),
}

/// Tracks registered topics and creates records for new fixtures.
#[derive(Debug, Default)]
pub struct DiscoveryOrchestrator {
    topics: HashMap<String, DeviceHandle>,
    add_discovered_used: bool,
}

impl DiscoveryOrchestrator {
    pub fn new(add_discovered_used: bool) -> Self {
        Self {
            topics: HashMap::new(),
            add_discovered_used,
        }
    }

    pub fn handle_for(&self, topic: &str) -> Option<DeviceHandle> {
        self.topics.get(topic).copied()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Resolve a validated state report to a record.
    pub async fn resolve<R>(
        &mut self,
        registry: &R,
        topic: &str,
        identity: &DeviceIdentity,
        message: &StateMessage,
    ) -> Resolution
    where
        R: DeviceRegistry + ?Sized,
    {
        if let Some(handle) = self.handle_for(topic) {
            return Resolution::Known(handle);
        }

        let Some(kind) = DeviceKind::for_device_type(identity.device_type()) else {
            warn!(
                topic = %topic,
                "Unsupported device type '{}', message dropped",
                identity.device_type()
            );
            return Resolution::Unsupported;
        };

        match registry.find_by_identity(identity).await {
            Ok(Some(record)) => {
                debug!(topic = %topic, unit = record.handle.0, "Adopting existing device");
                self.topics.insert(topic.to_string(), record.handle);
                return Resolution::Adopted(record.handle);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(topic = %topic, "Device lookup failed: {}", e);
                return Resolution::Failed(e);
            }
        }

        let profile = classify(identity.device_type());
        let initial = apply_inbound(&profile, &DeviceState::default(), message);
        let request = CreateDevice {
            identity: identity.clone(),
            name: identity.default_name(),
            kind,
            switch_kind: profile.switch_kind,
            used: self.add_discovered_used,
            initial,
        };

        match registry.create(request).await {
            Ok(record) => {
                info!(
                    topic = %topic,
                    unit = record.handle.0,
                    "Discovered {} device '{}'",
                    record.kind,
                    record.name
                );
                self.topics.insert(topic.to_string(), record.handle);
                Resolution::Created(record)
            }
            Err(e) => {
                warn!(topic = %topic, "Device creation failed: {}", e);
                Resolution::Failed(e)
            }
        }
    }

    /// Drop every topic mapped to `handle`. Returns how many were dropped.
    pub fn forget_handle(&mut self, handle: DeviceHandle) -> usize {
        let before = self.topics.len();
        self.topics.retain(|_, mapped| *mapped != handle);
        before - self.topics.len()
    }
}
