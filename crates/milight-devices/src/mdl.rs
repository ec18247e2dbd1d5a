//! Device model shared by the translation engine and the host registry.
//!
//! The host registry owns device records. The types here describe what the
//! bridge knows about a record (identity, declared kind, last reported state)
//! and the field values it computes for create and update requests.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registry unit number of a device record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceHandle(pub u32);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// Error raised when an identity is built from incomplete topic fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Identity field '{0}' is empty")]
    EmptyField(&'static str),
}

/// Identity of one fixture group on the hub.
///
/// Built from a state-topic match and immutable afterwards. All three fields
/// are non-empty, except for the wildcard identity used to render
/// subscription filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    device_id: String,
    device_type: String,
    group_id: String,
}

impl DeviceIdentity {
    /// Create an identity, rejecting empty fields.
    pub fn new(
        device_id: impl Into<String>,
        device_type: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let identity = Self {
            device_id: device_id.into(),
            device_type: device_type.into(),
            group_id: group_id.into(),
        };

        if identity.device_id.is_empty() {
            return Err(IdentityError::EmptyField("device_id"));
        }
        if identity.device_type.is_empty() {
            return Err(IdentityError::EmptyField("device_type"));
        }
        if identity.group_id.is_empty() {
            return Err(IdentityError::EmptyField("group_id"));
        }

        Ok(identity)
    }

    /// Identity whose fields render as the single-level MQTT wildcard.
    pub fn wildcard() -> Self {
        Self {
            device_id: String::new(),
            device_type: String::new(),
            group_id: String::new(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Default display name for a newly discovered record.
    pub fn default_name(&self) -> String {
        format!("{}/{}/{}", self.device_id, self.device_type, self.group_id)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device_id:{} type:{} group:{}",
            self.device_id, self.device_type, self.group_id
        )
    }
}

/// Color-mode discriminator of the registry color object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ColorMode {
    /// Plain white
    White,
    /// Color-temperature white
    Temperature,
    /// Full RGB
    Rgb,
}

impl TryFrom<u8> for ColorMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::White),
            2 => Ok(Self::Temperature),
            3 => Ok(Self::Rgb),
            other => Err(format!("unknown color mode {}", other)),
        }
    }
}

impl From<ColorMode> for u8 {
    fn from(mode: ColorMode) -> Self {
        match mode {
            ColorMode::White => 1,
            ColorMode::Temperature => 2,
            ColorMode::Rgb => 3,
        }
    }
}

/// Serialized color object stored on a device record (`{m,t,r,g,b}`).
///
/// Every channel is optional: hub messages update channels independently and
/// the record only carries what has been reported so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorState {
    #[serde(rename = "m", default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ColorMode>,
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub g: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b: Option<u8>,
}

impl ColorState {
    /// The RGB triple, when all three channels are known.
    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        match (self.r, self.g, self.b) {
            (Some(r), Some(g), Some(b)) => Some((r, g, b)),
            _ => None,
        }
    }

    pub fn set_rgb(&mut self, (r, g, b): (u8, u8, u8)) {
        self.r = Some(r);
        self.g = Some(g);
        self.b = Some(b);
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Serialize to the JSON string form the host stores.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Switch field of a record. Scenes reuse the field above the on/off range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchValue {
    #[default]
    Off,
    On,
    /// Disco scene, zero-based wire index
    Scene(u8),
}

/// Offset added to a disco scene index when stored in the switch field.
pub const SCENE_VALUE_OFFSET: i32 = 24;

impl SwitchValue {
    /// Raw numeric value as the host stores it.
    pub fn value(self) -> i32 {
        match self {
            Self::Off => 0,
            Self::On => 1,
            Self::Scene(mode) => SCENE_VALUE_OFFSET + i32::from(mode),
        }
    }

    pub fn is_on(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Level field of a record: a 0-100 brightness or a scene label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelValue {
    Percent(u8),
    Scene(u8),
}

impl Default for LevelValue {
    fn default() -> Self {
        Self::Percent(0)
    }
}

impl LevelValue {
    pub fn percent(self) -> Option<u8> {
        match self {
            Self::Percent(level) => Some(level),
            Self::Scene(_) => None,
        }
    }
}

impl fmt::Display for LevelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent(level) => write!(f, "{}", level),
            Self::Scene(mode) => write!(f, "Disco Mode {}", u16::from(*mode) + 1),
        }
    }
}

/// Last known state of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceState {
    pub switch: SwitchValue,
    pub level: LevelValue,
    pub color: Option<ColorState>,
}

/// Field values for one registry update. `color` is `None` when the update
/// leaves the stored color untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUpdate {
    pub switch: SwitchValue,
    pub level: LevelValue,
    pub color: Option<ColorState>,
}

impl DeviceUpdate {
    /// Apply the update on top of a stored state.
    pub fn apply_to(&self, state: &mut DeviceState) {
        state.switch = self.switch;
        state.level = self.level;
        if let Some(color) = &self.color {
            state.color = Some(color.clone());
        }
    }
}

/// How the host renders the switch of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchKind {
    Dimmer,
    OnOff,
    Unsupported,
}

impl SwitchKind {
    /// Host switch-type code, `None` for unsupported kinds.
    pub fn code(self) -> Option<u8> {
        match self {
            Self::Dimmer => Some(7),
            Self::OnOff => Some(0),
            Self::Unsupported => None,
        }
    }
}

/// Declared device type of a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    RgbCct,
    Cct,
    Rgbw,
    Rgb,
    Dimmer,
}

const TYPE_COLOR_SWITCH: u8 = 0xf1;
const TYPE_GENERAL_SWITCH: u8 = 0xf4;

impl DeviceKind {
    /// Host device type code.
    pub fn type_code(self) -> u8 {
        match self {
            Self::Dimmer => TYPE_GENERAL_SWITCH,
            _ => TYPE_COLOR_SWITCH,
        }
    }

    /// Host device subtype code.
    pub fn subtype_code(self) -> u8 {
        match self {
            Self::RgbCct => 0x04,
            Self::Cct => 0x08,
            Self::Rgbw => 0x01,
            Self::Rgb => 0x02,
            Self::Dimmer => 0x49,
        }
    }

    /// Reverse lookup from host codes.
    pub fn from_codes(type_code: u8, subtype_code: u8) -> Option<Self> {
        [Self::RgbCct, Self::Cct, Self::Rgbw, Self::Rgb, Self::Dimmer]
            .into_iter()
            .find(|kind| kind.type_code() == type_code && kind.subtype_code() == subtype_code)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RgbCct => "RGBCCT",
            Self::Cct => "CCT",
            Self::Rgbw => "RGBW",
            Self::Rgb => "RGB",
            Self::Dimmer => "DIMMER",
        };
        f.write_str(label)
    }
}

/// A device record as read back from the host registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub handle: DeviceHandle,
    pub identity: DeviceIdentity,
    pub name: String,
    pub kind: DeviceKind,
    pub switch_kind: SwitchKind,
    pub used: bool,
    pub state: DeviceState,
}
