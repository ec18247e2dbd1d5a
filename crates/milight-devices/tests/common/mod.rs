//! Shared fixtures for bridge integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use milight_devices::mdl::DeviceRecord;
use milight_devices::registry::RegistryResult;
use milight_devices::{
    BridgeConfig, BridgeService, CreateDevice, DeviceHandle, DeviceIdentity, DeviceKind,
    DeviceRegistry, DeviceUpdate, InMemoryRegistry, Transport, TransportError, TransportResult,
};

pub const STATE_TOPIC: &str = "milight/states/0x1C8E/rgb_cct/1";
pub const COMMAND_TOPIC: &str = "milight/0x1C8E/rgb_cct/1";

/// Transport that records everything it is asked to do.
#[derive(Default)]
pub struct RecordingTransport {
    connected: AtomicBool,
    published: Mutex<Vec<(String, String)>>,
    subscriptions: Mutex<Vec<String>>,
    reconnects: AtomicUsize,
}

impl RecordingTransport {
    pub fn connected() -> Self {
        let transport = Self::default();
        transport.set_connected(true);
        transport
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> TransportResult<()> {
        if !self.is_connected() {
            return Err(TransportError::Unavailable("test link down".to_string()));
        }
        let payload = String::from_utf8(payload).unwrap();
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, filters: &[String]) -> TransportResult<()> {
        self.subscriptions
            .lock()
            .unwrap()
            .extend(filters.iter().cloned());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> TransportResult<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory registry that counts every call made through the trait.
#[derive(Default)]
pub struct CountingRegistry {
    pub inner: InMemoryRegistry,
    calls: AtomicUsize,
}

impl CountingRegistry {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceRegistry for CountingRegistry {
    async fn find_by_identity(
        &self,
        identity: &DeviceIdentity,
    ) -> RegistryResult<Option<DeviceRecord>> {
        self.count();
        self.inner.find_by_identity(identity).await
    }

    async fn get(&self, handle: DeviceHandle) -> RegistryResult<Option<DeviceRecord>> {
        self.count();
        self.inner.get(handle).await
    }

    async fn create(&self, request: CreateDevice) -> RegistryResult<DeviceRecord> {
        self.count();
        self.inner.create(request).await
    }

    async fn update(&self, handle: DeviceHandle, update: &DeviceUpdate) -> RegistryResult<()> {
        self.count();
        self.inner.update(handle, update).await
    }

    async fn retype(&self, handle: DeviceHandle, kind: DeviceKind) -> RegistryResult<()> {
        self.count();
        self.inner.retype(handle, kind).await
    }

    async fn remove(&self, handle: DeviceHandle) -> RegistryResult<()> {
        self.count();
        self.inner.remove(handle).await
    }
}

pub type TestService = BridgeService<CountingRegistry, RecordingTransport>;
pub type Fixture = (TestService, Arc<CountingRegistry>, Arc<RecordingTransport>);

/// Route bridge logs to the test harness output.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("milight_devices=debug"))
        .with_target(false)
        .with_test_writer()
        .try_init();
}

/// Log lines written on the current thread while the guard is held.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn start() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let buffer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || buffer.clone())
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Service over fresh fixtures with a config tweak applied.
pub fn service_with(configure: impl FnOnce(&mut BridgeConfig)) -> Fixture {
    init_logging();

    let mut config = BridgeConfig::default();
    configure(&mut config);

    let registry = Arc::new(CountingRegistry::default());
    let transport = Arc::new(RecordingTransport::connected());
    let service = BridgeService::new(
        registry.clone(),
        transport.clone(),
        config.resolve().unwrap(),
    );
    (service, registry, transport)
}

pub fn service() -> Fixture {
    service_with(|_| {})
}

pub fn json(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap()
}
