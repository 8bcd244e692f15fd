//! simlink demo — drives a scripted in-process simulator.
//!
//! ```text
//! ┌──────────────────────── LocalExecutor ─────────────────────────┐
//! │                                                                │
//! │  scenario ──▶ RpcEngine ──▶ PortTransport ══▶ RemotePort       │
//! │                  ▲                                │            │
//! │                  │                                ▼            │
//! │              PortDriver ◀══════════════════ ScriptedSimulator  │
//! │                                                                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Log level follows `RUST_LOG` (default `info`).

use std::collections::HashMap;

use anyhow::Context;
use log::{info, warn};
use serde_json::{Value, json};
use simlink::adapters::port_transport::{RemotePort, port_channel};
use simlink::rpc::message::{
    ChannelMessage, CommandMessage, EventMessage, HelloMessage, PAUSE_EVENT, ResponseMessage,
};
use simlink::sim::commands;
use simlink::{ClientConfig, ListenOptions, PauseCondition, RpcEngine, SimStartParams};
use tracing_subscriber::EnvFilter;

const FIRMWARE: &[u8] = &[0xE9, 0x03, 0x02, 0x20, 0x00, 0xFF, 0x7F, 0x40];

// ── Scripted simulator ───────────────────────────────────────

/// Minimal stand-in for a real simulator: stores files, keeps a clock and
/// honours pause points on resume.
struct ScriptedSimulator {
    port: RemotePort,
    files: HashMap<String, Value>,
    pause_points: Vec<(String, PauseCondition)>,
    nanos: u64,
    running: bool,
}

impl ScriptedSimulator {
    fn new(port: RemotePort) -> Self {
        Self {
            port,
            files: HashMap::new(),
            pause_points: Vec::new(),
            nanos: 0,
            running: false,
        }
    }

    async fn run(mut self) {
        if self
            .port
            .post(HelloMessage {
                protocol_version: simlink::config::PROTOCOL_VERSION,
            })
            .is_err()
        {
            return;
        }
        loop {
            match self.port.recv().await {
                ChannelMessage::Command(command) => {
                    if self.handle(command).is_err() {
                        break;
                    }
                }
                other => warn!("SIM: unexpected {:?}", other),
            }
        }
    }

    fn handle(&mut self, command: CommandMessage) -> Result<(), simlink::TransportError> {
        let params = &command.params;
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let result = match command.command.as_str() {
            commands::FILE_UPLOAD => {
                self.files.insert(name.to_owned(), params.clone());
                Ok(Value::Null)
            }
            commands::FILE_DOWNLOAD => self
                .files
                .get(name)
                .cloned()
                .ok_or_else(|| json!({"code": 404, "message": format!("No such file: {name}")})),
            commands::SIM_START => {
                self.nanos = 0;
                self.running = !params.get("pause").and_then(Value::as_bool).unwrap_or(false);
                Ok(Value::Null)
            }
            commands::SIM_STATUS => Ok(json!({"running": self.running, "nanos": self.nanos})),
            commands::SERIAL_MONITOR_LISTEN => Ok(Value::Null),
            commands::PAUSE_POINT_ADD => {
                let id = params.get("id").and_then(Value::as_str).unwrap_or_default();
                match serde_json::from_value::<PauseCondition>(params.clone()) {
                    Ok(condition) => {
                        self.pause_points.push((id.to_owned(), condition));
                        Ok(Value::Null)
                    }
                    Err(e) => Err(json!({"code": -32602, "message": e.to_string()})),
                }
            }
            commands::PAUSE_POINT_REMOVE => {
                let id = params.get("id").and_then(Value::as_str).unwrap_or_default();
                self.pause_points.retain(|(p, _)| p != id);
                Ok(Value::Null)
            }
            commands::SIM_RESUME => {
                self.running = true;
                Ok(Value::Null)
            }
            other => Err(json!({"code": -32601, "message": format!("Unknown command: {other}")})),
        };

        let (error, result) = match result {
            Ok(value) => (false, value),
            Err(value) => (true, value),
        };
        self.port.post(ResponseMessage {
            id: command.id,
            error,
            result,
        })?;

        if self.running {
            self.advance()?;
        }
        Ok(())
    }

    /// Run to the first pause point that can fire, then stop there.
    fn advance(&mut self) -> Result<(), simlink::TransportError> {
        let Some((id, condition)) = self.pause_points.first().cloned() else {
            return Ok(());
        };
        self.pause_points.remove(0);
        match condition {
            PauseCondition::TimeAbsolute { nanos } => self.nanos = self.nanos.max(nanos),
            PauseCondition::TimeRelative { nanos } => self.nanos += nanos,
            PauseCondition::SerialBytes { bytes } => {
                self.nanos += 250_000;
                let mut output = b"boot: ".to_vec();
                output.extend_from_slice(&bytes);
                self.port.post(EventMessage {
                    event: "serial-monitor:data".into(),
                    payload: json!({"bytes": output}),
                    nanos: self.nanos,
                })?;
            }
        }
        self.running = false;
        self.port.post(EventMessage {
            event: PAUSE_EVENT.into(),
            payload: json!({"pausePoint": id, "pausePointInfo": {"nanos": self.nanos}}),
            nanos: self.nanos,
        })
    }
}

// ── Scenario ─────────────────────────────────────────────────

async fn scenario<T: simlink::Transport>(client: &RpcEngine<T>) -> anyhow::Result<()> {
    client.connected().await.context("connecting to simulator")?;

    client.file_upload("firmware.bin", FIRMWARE).await?;
    let echoed = client.file_download("firmware.bin").await?;
    anyhow::ensure!(echoed.as_bytes() == FIRMWARE, "firmware changed in transit");
    info!("DEMO: firmware round trip ok ({} bytes)", FIRMWARE.len());

    let serial = client.listen(
        "serial-monitor:data",
        |event| {
            let text = event
                .payload
                .get("bytes")
                .and_then(|b| serde_json::from_value::<Vec<u8>>(b.clone()).ok())
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default();
            info!("DEMO: serial @{}ns: {:?}", event.nanos, text);
        },
        ListenOptions::default(),
    );
    client.serial_monitor_listen().await?;

    client.sim_start(&SimStartParams::new("firmware.bin").paused()).await?;
    info!("DEMO: started paused (running = {})", client.running());

    let info = client.delay(1_000_000).await?;
    info!("DEMO: delay done at {}ns, info {}", client.last_nanos(), info);

    let info = client.wait_for_serial_bytes(b"ready").await?;
    info!("DEMO: saw serial marker at {}ns, info {}", client.last_nanos(), info);

    client.paused().await;
    let status = client.sim_status().await?;
    info!("DEMO: status {}", status);

    if let Err(e) = client.pin_read("led1", "A").await {
        info!("DEMO: pin:read rejected as expected: {}", e);
    }

    serial.unsubscribe();
    client.close();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig {
        server: Some("in-process simulator".into()),
        ..ClientConfig::default()
    };
    config.validate()?;

    let (transport, remote) = port_channel();
    let driver = transport.driver();
    let client = RpcEngine::new(transport, config);
    client.set_on_error(|e| warn!("DEMO: simulator error: {}", e.message));
    client.set_on_connected(|version| info!("DEMO: simulator speaks protocol {}", version));

    let executor: edge_executor::LocalExecutor<'_, 8> = edge_executor::LocalExecutor::new();
    executor.spawn(driver.run()).detach();
    executor.spawn(ScriptedSimulator::new(remote).run()).detach();

    futures_lite::future::block_on(executor.run(scenario(&client)))
}
