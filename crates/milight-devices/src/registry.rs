//! Host device registry.
//!
//! The host owns device records; the bridge only reads them back and asks
//! for creation, updates, re-typing and removal through [`DeviceRegistry`].
//! [`InMemoryRegistry`] keeps records in memory and backs the standalone
//! binary and the tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::mdl::{
    DeviceHandle, DeviceIdentity, DeviceKind, DeviceRecord, DeviceState, DeviceUpdate, SwitchKind,
};

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Device not found: {0}")]
    NotFound(DeviceHandle),

    #[error("Device already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid device identity: {0}")]
    InvalidIdentity(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Request to create a record for a newly discovered fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDevice {
    pub identity: DeviceIdentity,
    pub name: String,
    pub kind: DeviceKind,
    pub switch_kind: SwitchKind,
    /// Whether the host shows the record among active devices.
    pub used: bool,
    pub initial: DeviceUpdate,
}

/// Operations the bridge needs from the host registry.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Find a record carrying the identity triple.
    async fn find_by_identity(
        &self,
        identity: &DeviceIdentity,
    ) -> RegistryResult<Option<DeviceRecord>>;

    async fn get(&self, handle: DeviceHandle) -> RegistryResult<Option<DeviceRecord>>;

    /// Create a record and return it with its allocated handle.
    async fn create(&self, request: CreateDevice) -> RegistryResult<DeviceRecord>;

    async fn update(&self, handle: DeviceHandle, update: &DeviceUpdate) -> RegistryResult<()>;

    /// Change the declared kind of a record, keeping its state and identity.
    async fn retype(&self, handle: DeviceHandle, kind: DeviceKind) -> RegistryResult<()>;

    async fn remove(&self, handle: DeviceHandle) -> RegistryResult<()>;
}

/// Highest unit number a host record can carry.
pub const MAX_UNIT: u32 = 255;

/// In-memory registry.
#[derive(Clone, Default)]
pub struct InMemoryRegistry {
    devices: Arc<RwLock<BTreeMap<DeviceHandle, DeviceRecord>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    pub async fn list(&self) -> Vec<DeviceRecord> {
        self.devices.read().await.values().cloned().collect()
    }

    /// Rename a record, as an operator would from the host UI.
    pub async fn rename(
        &self,
        handle: DeviceHandle,
        name: impl Into<String>,
    ) -> RegistryResult<()> {
        let mut devices = self.devices.write().await;
        let record = devices
            .get_mut(&handle)
            .ok_or(RegistryError::NotFound(handle))?;
        record.name = name.into();
        Ok(())
    }

    /// First unused unit number starting at 1.
    fn next_handle(devices: &BTreeMap<DeviceHandle, DeviceRecord>) -> Option<DeviceHandle> {
        (1..=MAX_UNIT)
            .map(DeviceHandle)
            .find(|handle| !devices.contains_key(handle))
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryRegistry {
    async fn find_by_identity(
        &self,
        identity: &DeviceIdentity,
    ) -> RegistryResult<Option<DeviceRecord>> {
        let devices = self.devices.read().await;
        let found = devices
            .values()
            .find(|record| &record.identity == identity)
            .cloned();
        debug!(
            "find_by_identity {} found {}",
            identity,
            usize::from(found.is_some())
        );
        Ok(found)
    }

    async fn get(&self, handle: DeviceHandle) -> RegistryResult<Option<DeviceRecord>> {
        Ok(self.devices.read().await.get(&handle).cloned())
    }

    async fn create(&self, request: CreateDevice) -> RegistryResult<DeviceRecord> {
        if request.switch_kind == SwitchKind::Unsupported {
            return Err(RegistryError::InvalidIdentity(format!(
                "{} has no supported switch type",
                request.identity
            )));
        }

        let mut devices = self.devices.write().await;

        if devices
            .values()
            .any(|record| record.identity == request.identity)
        {
            return Err(RegistryError::AlreadyExists(request.identity.default_name()));
        }

        let handle = Self::next_handle(&devices)
            .ok_or_else(|| RegistryError::Storage("no free unit number".to_string()))?;

        let mut state = DeviceState::default();
        request.initial.apply_to(&mut state);

        let record = DeviceRecord {
            handle,
            identity: request.identity,
            name: request.name,
            kind: request.kind,
            switch_kind: request.switch_kind,
            used: request.used,
            state,
        };

        info!("Creating device with unit: {}", handle.0);
        devices.insert(handle, record.clone());
        Ok(record)
    }

    async fn update(&self, handle: DeviceHandle, update: &DeviceUpdate) -> RegistryResult<()> {
        let mut devices = self.devices.write().await;
        let record = devices
            .get_mut(&handle)
            .ok_or(RegistryError::NotFound(handle))?;
        update.apply_to(&mut record.state);
        Ok(())
    }

    async fn retype(&self, handle: DeviceHandle, kind: DeviceKind) -> RegistryResult<()> {
        let mut devices = self.devices.write().await;
        let record = devices
            .get_mut(&handle)
            .ok_or(RegistryError::NotFound(handle))?;
        record.kind = kind;
        Ok(())
    }

    async fn remove(&self, handle: DeviceHandle) -> RegistryResult<()> {
        self.devices
            .write()
            .await
            .remove(&handle)
            .map(|_| ())
            .ok_or(RegistryError::NotFound(handle))
    }
}
