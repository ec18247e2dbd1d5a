//! Line-oriented host console.
//!
//! With `run --stdin` each input line is a JSON request standing in for the
//! host registry's callbacks:
//!
//! ```text
//! {"op":"command","unit":1,"command":"Set Level","level":40}
//! {"op":"command","unit":1,"command":"Set Color","level":80,"color":"{\"m\":3,\"r\":255,\"g\":0,\"b\":0}"}
//! {"op":"rename","unit":1,"name":"Kitchen @RGBW"}
//! {"op":"remove","unit":1}
//! {"op":"list"}
//! ```

use anyhow::{Context, Result};
use milight_devices::{DeviceHandle, DeviceRegistry, HostRequest, InMemoryRegistry};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One console request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ConsoleRequest {
    Command {
        unit: u32,
        command: String,
        #[serde(default)]
        level: u8,
        #[serde(default)]
        color: Option<String>,
    },
    Rename {
        unit: u32,
        name: String,
    },
    Remove {
        unit: u32,
    },
    List,
}

impl ConsoleRequest {
    pub fn parse(line: &str) -> Result<Self> {
        serde_json::from_str(line).with_context(|| format!("Invalid request '{}'", line))
    }
}

/// Read requests until EOF or until the service stops listening.
pub async fn run_console<I>(
    input: I,
    registry: InMemoryRegistry,
    requests: mpsc::Sender<HostRequest>,
) -> Result<()>
where
    I: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = match ConsoleRequest::parse(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("{:#}", e);
                continue;
            }
        };

        let forwarded = match request {
            ConsoleRequest::Command {
                unit,
                command,
                level,
                color,
            } => Some(HostRequest::Command {
                handle: DeviceHandle(unit),
                command,
                level,
                color,
            }),
            ConsoleRequest::Rename { unit, name } => {
                match registry.rename(DeviceHandle(unit), name).await {
                    Ok(()) => Some(HostRequest::DeviceModified(DeviceHandle(unit))),
                    Err(e) => {
                        warn!("Rename failed: {}", e);
                        None
                    }
                }
            }
            ConsoleRequest::Remove { unit } => match registry.remove(DeviceHandle(unit)).await {
                Ok(()) => Some(HostRequest::DeviceRemoved(DeviceHandle(unit))),
                Err(e) => {
                    warn!("Remove failed: {}", e);
                    None
                }
            },
            ConsoleRequest::List => {
                for record in registry.list().await {
                    info!(
                        "{}/{}: {} switch={} level={} color={}",
                        record.handle,
                        record.name,
                        record.kind,
                        record.state.switch.value(),
                        record.state.level,
                        record
                            .state
                            .color
                            .as_ref()
                            .map(|color| color.to_json())
                            .unwrap_or_default()
                    );
                }
                None
            }
        };

        if let Some(request) = forwarded {
            if requests.send(request).await.is_err() {
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use milight_devices::{
        CreateDevice, DeviceIdentity, DeviceKind, DeviceUpdate, LevelValue, SwitchKind,
        SwitchValue,
    };

    #[test]
    fn test_parse_requests() {
        assert_eq!(
            ConsoleRequest::parse(r#"{"op":"command","unit":3,"command":"On"}"#).unwrap(),
            ConsoleRequest::Command {
                unit: 3,
                command: "On".to_string(),
                level: 0,
                color: None,
            }
        );
        assert_eq!(
            ConsoleRequest::parse(r#"{"op":"list"}"#).unwrap(),
            ConsoleRequest::List
        );
        assert!(ConsoleRequest::parse(r#"{"op":"explode"}"#).is_err());
        assert!(ConsoleRequest::parse("On").is_err());
    }

    #[tokio::test]
    async fn test_console_forwards_requests() {
        let registry = InMemoryRegistry::new();
        let identity = DeviceIdentity::new("0x1", "rgb_cct", "1").unwrap();
        registry
            .create(CreateDevice {
                name: identity.default_name(),
                identity,
                kind: DeviceKind::RgbCct,
                switch_kind: SwitchKind::Dimmer,
                used: true,
                initial: DeviceUpdate {
                    switch: SwitchValue::Off,
                    level: LevelValue::Percent(0),
                    color: None,
                },
            })
            .await
            .unwrap();

        let input = concat!(
            r#"{"op":"command","unit":1,"command":"Set Level","level":40}"#,
            "\n",
            "garbage\n",
            r#"{"op":"rename","unit":1,"name":"Desk @RGB"}"#,
            "\n",
            r#"{"op":"rename","unit":7,"name":"nobody"}"#,
            "\n",
            r#"{"op":"remove","unit":1}"#,
            "\n",
        );

        let (tx, mut rx) = mpsc::channel(8);
        run_console(input.as_bytes(), registry.clone(), tx)
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(HostRequest::Command {
                handle: DeviceHandle(1),
                command: "Set Level".to_string(),
                level: 40,
                color: None,
            })
        );
        assert_eq!(
            rx.recv().await,
            Some(HostRequest::DeviceModified(DeviceHandle(1)))
        );
        assert_eq!(
            rx.recv().await,
            Some(HostRequest::DeviceRemoved(DeviceHandle(1)))
        );
        assert_eq!(rx.recv().await, None);
        assert!(registry.is_empty().await);
    }
}
