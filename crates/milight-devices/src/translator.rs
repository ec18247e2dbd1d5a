//! Bidirectional state translation between hub JSON and the device model.
//!
//! ## Inbound (hub -> registry)
//!
//! | hub field | effect |
//! |-----------|--------|
//! | `state` | `ON` / `OFF` switch |
//! | `brightness` | 0-255 scaled to a 0-100 level |
//! | `bulb_mode` | color mode, or a disco scene together with `mode` |
//! | `color_temp` | 153-370 mireds scaled to 0-255 `t` |
//! | `hue`, `saturation` | RGB recomputed with the stored counterpart |
//! | `color` | overwrites the provided `r`/`g`/`b` channels |
//!
//! ## Outbound (registry command -> hub)
//!
//! A closed [`Command`] set is mapped to a [`CommandPayload`] carrying
//! `status`, `level`, `command`, `temperature`, `color` and `mode`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::classifier::CapabilityProfile;
use crate::color::{hs_to_rgb, rgb_to_hs};
use crate::mdl::{ColorMode, DeviceState, DeviceUpdate, LevelValue, SwitchValue};

/// Result type for translation.
pub type TranslateResult<T> = Result<T, TranslateError>;

/// Translation errors. None of them is fatal: the caller logs and drops
/// the message or command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid color spec: {0}")]
    InvalidColorSpec(String),

    #[error("Unknown command: '{0}'")]
    UnknownCommand(String),

    #[error("Invalid disco mode command: '{0}'")]
    InvalidDiscoMode(String),

    #[error("Unsupported device type: {0}")]
    UnsupportedDeviceType(String),

    #[error("Relative brightness command '{0}' needs the device's last level")]
    UnresolvedStep(String),
}

/// Lowest and highest `color_temp` the hub reports, in mireds.
pub const COLOR_TEMP_MIN: u16 = 153;
pub const COLOR_TEMP_MAX: u16 = 370;

/// Highest wire index of a disco scene.
pub const MAX_SCENE_INDEX: u8 = 8;

/// Brightness change applied by "Bright Up" / "Bright Down".
pub const BRIGHTNESS_STEP: u8 = 5;

// ============================================================================
// Inbound
// ============================================================================

/// Channels of a hub `color` object. Any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ColorChannels {
    #[serde(default)]
    pub r: Option<u8>,
    #[serde(default)]
    pub g: Option<u8>,
    #[serde(default)]
    pub b: Option<u8>,
}

/// State report published by the hub on a state topic.
///
/// Numbers are read as `f64` so that both integer and fractional encodings
/// are accepted; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StateMessage {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub brightness: Option<f64>,
    #[serde(default)]
    pub bulb_mode: Option<String>,
    #[serde(default)]
    pub mode: Option<f64>,
    #[serde(default)]
    pub color_temp: Option<f64>,
    #[serde(default)]
    pub hue: Option<f64>,
    #[serde(default)]
    pub saturation: Option<f64>,
    #[serde(default)]
    pub color: Option<ColorChannels>,
}

impl StateMessage {
    /// Parse a raw MQTT payload. Anything other than a JSON object with
    /// well-typed fields is malformed.
    pub fn parse(payload: &[u8]) -> TranslateResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| TranslateError::MalformedPayload(format!("Invalid JSON: {}", e)))
    }
}

/// Scale hub brightness (0-255) to a 0-100 level, truncating.
pub fn brightness_to_level(brightness: f64) -> u8 {
    let brightness = brightness.clamp(0.0, 255.0) as u32;
    (brightness * 100 / 255) as u8
}

/// Scale hub color temperature (mireds) to the registry's 0-255 `t`.
pub fn color_temp_to_t(mireds: f64) -> u8 {
    let mireds = mireds.clamp(f64::from(COLOR_TEMP_MIN), f64::from(COLOR_TEMP_MAX)) as u32;
    let span = u32::from(COLOR_TEMP_MAX - COLOR_TEMP_MIN);
    ((mireds - u32::from(COLOR_TEMP_MIN)) * 255 / span) as u8
}

fn normalize_hue(hue: f64) -> u16 {
    (hue as i64).rem_euclid(360) as u16
}

fn normalize_saturation(sat: f64) -> u8 {
    sat.clamp(0.0, 100.0) as u8
}

/// Compute the record update for a hub state report.
///
/// Hue and saturation are combined with the counterpart derived from the
/// stored RGB, so a report carrying only one of them keeps the other.
pub fn apply_inbound(
    profile: &CapabilityProfile,
    current: &DeviceState,
    message: &StateMessage,
) -> DeviceUpdate {
    let mut switch = current.switch;
    let mut level = current.level;
    let mut color = current.color.clone().unwrap_or_default();
    let mut color_changed = false;

    let (mut hue, mut sat) = color
        .rgb()
        .map(|(r, g, b)| rgb_to_hs(r, g, b))
        .unwrap_or((0, 0));

    if let Some(state) = &message.state {
        match state.as_str() {
            "ON" => switch = SwitchValue::On,
            "OFF" => switch = SwitchValue::Off,
            other => debug!("Ignoring unknown state '{}'", other),
        }
    }

    if let Some(brightness) = message.brightness {
        level = LevelValue::Percent(brightness_to_level(brightness));
    }

    if let Some(bulb_mode) = &message.bulb_mode {
        match bulb_mode.as_str() {
            "white" => {
                color.mode = Some(if profile.supports_cct {
                    ColorMode::Temperature
                } else {
                    ColorMode::White
                });
                color_changed = true;
            }
            "rgb" | "color" => {
                color.mode = Some(ColorMode::Rgb);
                color_changed = true;
            }
            "scene" => match message.mode {
                Some(mode) if (0.0..=f64::from(MAX_SCENE_INDEX)).contains(&mode) => {
                    let mode = mode as u8;
                    switch = SwitchValue::Scene(mode);
                    level = LevelValue::Scene(mode);
                }
                Some(mode) => warn!("Ignoring out of range scene mode {}", mode),
                None => debug!("Scene report without mode"),
            },
            other => debug!("Ignoring unknown bulb_mode '{}'", other),
        }
    }

    if let Some(color_temp) = message.color_temp {
        color.temperature = Some(color_temp_to_t(color_temp));
        color_changed = true;
    }

    if let Some(new_hue) = message.hue {
        hue = normalize_hue(new_hue);
        color.set_rgb(hs_to_rgb(hue, sat));
        color_changed = true;
    }

    if let Some(new_sat) = message.saturation {
        sat = normalize_saturation(new_sat);
        color.set_rgb(hs_to_rgb(hue, sat));
        color_changed = true;
    }

    if let Some(channels) = &message.color {
        if let Some(r) = channels.r {
            color.r = Some(r);
        }
        if let Some(g) = channels.g {
            color.g = Some(g);
        }
        if let Some(b) = channels.b {
            color.b = Some(b);
        }
        color_changed = true;
    }

    DeviceUpdate {
        switch,
        level,
        color: if color_changed { Some(color) } else { None },
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Commands the host can send to a light.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// "Set Brightness" / "Set Level"
    SetLevel,
    On,
    SetFull,
    Off,
    SetWhite,
    SetColor,
    SetNight,
    SpeedUp,
    SpeedDown,
    /// "Disco Mode N", stored as the zero-based wire index
    DiscoMode(u8),
    BrightUp,
    BrightDown,
}

const DISCO_MODE_PREFIX: &str = "Disco Mode ";

impl FromStr for Command {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s {
            "Set Brightness" | "Set Level" => Self::SetLevel,
            "On" => Self::On,
            "Set Full" => Self::SetFull,
            "Off" => Self::Off,
            "Set White" => Self::SetWhite,
            "Set Color" => Self::SetColor,
            "Set Night" => Self::SetNight,
            "Speed Up" => Self::SpeedUp,
            "Speed Down" => Self::SpeedDown,
            "Bright Up" => Self::BrightUp,
            "Bright Down" => Self::BrightDown,
            other => {
                let Some(number) = other.strip_prefix(DISCO_MODE_PREFIX) else {
                    return Err(TranslateError::UnknownCommand(other.to_string()));
                };
                match number.parse::<u8>() {
                    Ok(n) if (1..=MAX_SCENE_INDEX + 1).contains(&n) => Self::DiscoMode(n - 1),
                    _ => return Err(TranslateError::InvalidDiscoMode(other.to_string())),
                }
            }
        };
        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetLevel => f.write_str("Set Brightness"),
            Self::On => f.write_str("On"),
            Self::SetFull => f.write_str("Set Full"),
            Self::Off => f.write_str("Off"),
            Self::SetWhite => f.write_str("Set White"),
            Self::SetColor => f.write_str("Set Color"),
            Self::SetNight => f.write_str("Set Night"),
            Self::SpeedUp => f.write_str("Speed Up"),
            Self::SpeedDown => f.write_str("Speed Down"),
            Self::DiscoMode(mode) => write!(f, "{}{}", DISCO_MODE_PREFIX, u16::from(*mode) + 1),
            Self::BrightUp => f.write_str("Bright Up"),
            Self::BrightDown => f.write_str("Bright Down"),
        }
    }
}

/// Turn "Bright Up" / "Bright Down" into "Set Brightness" with a level one
/// step away from `last_level`, kept within 5..=100. Other commands pass
/// through with `level` unchanged.
pub fn resolve_brightness_step(command: Command, level: u8, last_level: u8) -> (Command, u8) {
    match command {
        Command::BrightUp => (
            Command::SetLevel,
            last_level.saturating_add(BRIGHTNESS_STEP).min(100),
        ),
        Command::BrightDown => (
            Command::SetLevel,
            last_level
                .saturating_sub(BRIGHTNESS_STEP)
                .max(BRIGHTNESS_STEP),
        ),
        other => (other, level),
    }
}

/// `status` field of a command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchStatus {
    On,
    Off,
}

/// `command` field of a command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubCommand {
    SetWhite,
    NightMode,
    ModeSpeedUp,
    ModeSpeedDown,
}

/// RGB triple sent to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// JSON payload published on a command topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SwitchStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<HubCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,
}

impl CommandPayload {
    /// An empty payload is a no-op and must not be published.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn to_json(&self) -> TranslateResult<String> {
        serde_json::to_string(self)
            .map_err(|e| TranslateError::MalformedPayload(format!("Cannot encode payload: {}", e)))
    }
}

/// Color argument of "Set Color" as the host sends it.
#[derive(Debug, Clone, Default, Deserialize)]
struct ColorSpec {
    #[serde(default)]
    m: Option<u8>,
    #[serde(default)]
    t: Option<u8>,
    #[serde(default)]
    r: Option<u8>,
    #[serde(default)]
    g: Option<u8>,
    #[serde(default)]
    b: Option<u8>,
}

fn parse_color_spec(color: Option<&str>) -> TranslateResult<ColorSpec> {
    let raw = match color {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Err(TranslateError::InvalidColorSpec("no color given".to_string())),
    };

    serde_json::from_str(raw)
        .map_err(|e| TranslateError::MalformedPayload(format!("Illegal color '{}': {}", raw, e)))
}

/// Build the hub payload for a command.
///
/// `level` is the host's 0-100 level; `color` is the host's serialized
/// color object, only read by "Set Color".
pub fn build_outbound(
    profile: &CapabilityProfile,
    command: Command,
    level: u8,
    color: Option<&str>,
) -> TranslateResult<CommandPayload> {
    if !profile.is_supported() {
        return Err(TranslateError::UnsupportedDeviceType(format!(
            "cannot send '{}'",
            command
        )));
    }

    let mut payload = CommandPayload::default();

    match command {
        Command::SetLevel => {
            payload.level = Some(level);
            if level > 0 {
                payload.status = Some(SwitchStatus::On);
            }
        }
        Command::On => payload.status = Some(SwitchStatus::On),
        Command::SetFull => {
            payload.status = Some(SwitchStatus::On);
            payload.level = Some(100);
        }
        Command::Off => payload.status = Some(SwitchStatus::Off),
        Command::SetWhite => payload.command = Some(HubCommand::SetWhite),
        Command::SetColor => {
            let spec = parse_color_spec(color)?;
            payload.level = Some(level);

            match spec.m {
                Some(1) => payload.command = Some(HubCommand::SetWhite),
                Some(2) => {
                    let t = spec.t.ok_or_else(|| {
                        TranslateError::InvalidColorSpec(
                            "color mode 2 without temperature".to_string(),
                        )
                    })?;
                    payload.command = Some(HubCommand::SetWhite);
                    payload.temperature = Some((u32::from(t) * 100 / 255) as u8);
                }
                Some(3) => match (spec.r, spec.g, spec.b) {
                    (Some(r), Some(g), Some(b)) => payload.color = Some(Rgb { r, g, b }),
                    _ => {
                        return Err(TranslateError::InvalidColorSpec(
                            "color mode 3 without r/g/b".to_string(),
                        ))
                    }
                },
                Some(other) => {
                    return Err(TranslateError::InvalidColorSpec(format!(
                        "unsupported color mode {}",
                        other
                    )))
                }
                None => {
                    return Err(TranslateError::InvalidColorSpec(
                        "missing color mode".to_string(),
                    ))
                }
            }
        }
        Command::DiscoMode(mode) => payload.mode = Some(mode),
        Command::SetNight => payload.command = Some(HubCommand::NightMode),
        Command::SpeedUp => payload.command = Some(HubCommand::ModeSpeedUp),
        Command::SpeedDown => payload.command = Some(HubCommand::ModeSpeedDown),
        Command::BrightUp | Command::BrightDown => {
            return Err(TranslateError::UnresolvedStep(command.to_string()));
        }
    }

    Ok(payload)
}
