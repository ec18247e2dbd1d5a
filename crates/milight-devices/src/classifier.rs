//! Device capability classification.
//!
//! Two independent paths lead to a [`DeviceKind`]:
//! - the wire path, from the `device_type` segment of a hub topic;
//! - the naming path, from a tag an operator adds to a device's display
//!   name (`@RGBCCT`, `@CCT`, `@RGBW`, `@RGB`, `@DIMMER`).

use serde::{Deserialize, Serialize};

use crate::mdl::{DeviceKind, SwitchKind};

/// What a fixture can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub supports_rgb: bool,
    pub supports_cct: bool,
    pub dimmable: bool,
    pub switch_kind: SwitchKind,
}

impl CapabilityProfile {
    /// Profile for device types the bridge cannot drive.
    pub const UNSUPPORTED: Self = Self {
        supports_rgb: false,
        supports_cct: false,
        dimmable: false,
        switch_kind: SwitchKind::Unsupported,
    };

    pub fn is_supported(&self) -> bool {
        self.switch_kind != SwitchKind::Unsupported
    }
}

impl DeviceKind {
    /// Declared kind for a hub `device_type` discriminator.
    pub fn for_device_type(device_type: &str) -> Option<Self> {
        match device_type {
            "fut089" | "rgb_cct" => Some(Self::RgbCct),
            "cct" | "fut091" => Some(Self::Cct),
            "rgbw" => Some(Self::Rgbw),
            "rgb" => Some(Self::Rgb),
            _ => None,
        }
    }

    /// Kind forced by a tag in a device's display name.
    ///
    /// Tags are checked most specific first, so `@RGBCCT` wins over `@RGB`.
    pub fn from_name_tag(name: &str) -> Option<Self> {
        const TAGS: [(&str, DeviceKind); 5] = [
            ("@RGBCCT", DeviceKind::RgbCct),
            ("@CCT", DeviceKind::Cct),
            ("@RGBW", DeviceKind::Rgbw),
            ("@RGB", DeviceKind::Rgb),
            ("@DIMMER", DeviceKind::Dimmer),
        ];

        TAGS.iter()
            .find(|(tag, _)| name.contains(tag))
            .map(|(_, kind)| *kind)
    }

    /// Capabilities implied by the kind.
    pub fn profile(self) -> CapabilityProfile {
        let (supports_rgb, supports_cct) = match self {
            Self::RgbCct | Self::Rgbw => (true, true),
            Self::Cct => (false, true),
            Self::Rgb => (true, false),
            Self::Dimmer => (false, false),
        };

        CapabilityProfile {
            supports_rgb,
            supports_cct,
            dimmable: true,
            switch_kind: SwitchKind::Dimmer,
        }
    }
}

/// Classify a hub `device_type` discriminator.
pub fn classify(device_type: &str) -> CapabilityProfile {
    DeviceKind::for_device_type(device_type)
        .map(DeviceKind::profile)
        .unwrap_or(CapabilityProfile::UNSUPPORTED)
}
