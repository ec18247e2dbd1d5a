//! Topic templates with identity placeholders.
//!
//! A template is a slash-delimited topic in which some segments name an
//! identity field:
//!
//! ```text
//! milight/states/{device_id}/{device_type}/{group_id}
//!                     │            │            │
//! milight/states/   0x1C8E    rgb_cct           1
//! ```
//!
//! Placeholders are written either `{device_id}` or in the hub firmware's
//! `:device_id` form. `{hex_device_id}` is an alias of `{device_id}`.
//! Segments that look like placeholders but name an unknown field are
//! matched as literals.

use std::fmt;

use thiserror::Error;

use crate::mdl::{DeviceIdentity, IdentityError};

/// Single-level MQTT wildcard used for subscription filters.
pub const SINGLE_LEVEL_WILDCARD: &str = "+";

/// Result type for topic operations.
pub type TopicResult<T> = Result<T, TopicError>;

/// Topic template errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("Invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Identity field named by a placeholder segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    DeviceId,
    HexDeviceId,
    DeviceType,
    GroupId,
}

impl Placeholder {
    fn parse(segment: &str) -> Option<Self> {
        let name = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .or_else(|| segment.strip_prefix(':'))?;

        match name {
            "device_id" => Some(Self::DeviceId),
            "hex_device_id" => Some(Self::HexDeviceId),
            "device_type" => Some(Self::DeviceType),
            "group_id" => Some(Self::GroupId),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::DeviceId => "device_id",
            Self::HexDeviceId => "hex_device_id",
            Self::DeviceType => "device_type",
            Self::GroupId => "group_id",
        }
    }
}

/// One segment of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// Identity fields extracted from a topic. A field stays `None` when the
/// template has no placeholder for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicMatch {
    pub device_id: Option<String>,
    pub device_type: Option<String>,
    pub group_id: Option<String>,
}

impl TopicMatch {
    /// Build a validated identity. Fails unless all three fields are present
    /// and non-empty.
    pub fn identity(&self) -> Result<DeviceIdentity, IdentityError> {
        DeviceIdentity::new(
            self.device_id.clone().unwrap_or_default(),
            self.device_type.clone().unwrap_or_default(),
            self.group_id.clone().unwrap_or_default(),
        )
    }
}

/// Compiled topic template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl TopicTemplate {
    /// Compile a template string.
    pub fn compile(template: &str) -> TopicResult<Self> {
        if template.trim().is_empty() {
            return Err(TopicError::InvalidPattern {
                pattern: template.to_string(),
                reason: "pattern has no segments".to_string(),
            });
        }

        let segments = template
            .split('/')
            .map(|segment| match Placeholder::parse(segment) {
                Some(placeholder) => Segment::Placeholder(placeholder),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    /// The template string this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Match a concrete topic against the template.
    ///
    /// Returns `None` when the segment counts differ or a literal segment
    /// does not match exactly.
    pub fn matches(&self, topic: &str) -> Option<TopicMatch> {
        let parts: Vec<&str> = topic.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut found = TopicMatch::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Placeholder(Placeholder::DeviceId | Placeholder::HexDeviceId) => {
                    found.device_id = Some(part.to_string());
                }
                Segment::Placeholder(Placeholder::DeviceType) => {
                    found.device_type = Some(part.to_string());
                }
                Segment::Placeholder(Placeholder::GroupId) => {
                    found.group_id = Some(part.to_string());
                }
            }
        }

        Some(found)
    }

    /// Match a topic and require a complete identity.
    pub fn extract_identity(&self, topic: &str) -> Option<DeviceIdentity> {
        self.matches(topic).and_then(|found| found.identity().ok())
    }

    /// Render a topic for an identity. Empty identity fields render as the
    /// single-level wildcard.
    pub fn render(&self, identity: &DeviceIdentity) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => literal.as_str(),
                Segment::Placeholder(placeholder) => {
                    let value = match placeholder {
                        Placeholder::DeviceId | Placeholder::HexDeviceId => identity.device_id(),
                        Placeholder::DeviceType => identity.device_type(),
                        Placeholder::GroupId => identity.group_id(),
                    };
                    if value.is_empty() {
                        SINGLE_LEVEL_WILDCARD
                    } else {
                        value
                    }
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Subscription filter covering every topic the template can match.
    pub fn subscription_filter(&self) -> String {
        self.render(&DeviceIdentity::wildcard())
    }
}

impl fmt::Display for TopicTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(literal) => literal.clone(),
                Segment::Placeholder(placeholder) => format!("{{{}}}", placeholder.name()),
            })
            .collect();
        f.write_str(&rendered.join("/"))
    }
}

impl std::str::FromStr for TopicTemplate {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::compile(s)
    }
}
