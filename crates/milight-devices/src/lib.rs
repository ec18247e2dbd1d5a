//! Milight hub bridge
//!
//! Mirrors the lights of an ESP8266 Milight Hub into a host device registry
//! over MQTT, and turns host commands back into hub command messages.
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `mqtt` | ✅ | MQTT transport over `rumqttc` |
//!
//! ## Architecture
//!
//! - **TopicTemplate**: extracts device identity from state topics and renders command topics
//! - **Classifier**: maps the hub `device_type` to a capability profile
//! - **Translator**: hub JSON <-> device record fields, both directions
//! - **DiscoveryOrchestrator**: creates registry records for unseen topics
//! - **DeviceRegistry**: host registry interface, with an in-memory implementation
//! - **Transport**: publish/subscribe link, with an MQTT implementation
//! - **BridgeService**: the event loop driving all of the above

pub mod classifier;
pub mod color;
pub mod config;
pub mod discovery;
pub mod mdl;
pub mod registry;
pub mod topic;
pub mod translator;

// Transport interface and the events it produces
pub mod adapter;
pub mod adapters;

pub mod service;

// Re-exports for convenience
pub use adapter::{HostRequest, Transport, TransportError, TransportEvent, TransportResult};
pub use classifier::{classify, CapabilityProfile};
pub use config::{
    BridgeConfig, BridgeOptions, BridgeSettings, ConfigError, DebugLevel, MqttSettings,
};
pub use discovery::{DiscoveryOrchestrator, Resolution};
pub use mdl::{
    ColorMode, ColorState, DeviceHandle, DeviceIdentity, DeviceKind, DeviceRecord, DeviceState,
    DeviceUpdate, LevelValue, SwitchKind, SwitchValue,
};
pub use registry::{
    CreateDevice, DeviceRegistry, InMemoryRegistry, RegistryError, RegistryResult,
};
pub use service::{BridgeService, CommandOutcome, MessageOutcome};
pub use topic::{TopicError, TopicMatch, TopicTemplate};
pub use translator::{Command, CommandPayload, StateMessage, TranslateError};

#[cfg(feature = "mqtt")]
pub use adapters::MqttTransport;
