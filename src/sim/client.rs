//! Simulator API on top of the RPC engine.
//!
//! Every method issues its command synchronously and hands back a future
//! for the result, so the order in which commands reach the channel is
//! the order in which the methods were called.

use std::future::Future;
use std::rc::Rc;

use futures_lite::future::try_zip;
use log::debug;
use serde_json::{Value, json};

use crate::base64;
use crate::error::{ClientError, Result};
use crate::rpc::engine::RpcEngine;
use crate::rpc::pause_point::{PauseCondition, PausePoint};
use crate::rpc::pending::PendingCommand;
use crate::rpc::transport::Transport;

use super::commands::{
    CONTROL_SET, ControlSetParams, FILE_DOWNLOAD, FILE_UPLOAD, FRAMEBUFFER_READ, FileContent,
    PAUSE_POINT_ADD, PAUSE_POINT_REMOVE, PIN_READ, PinReadParams, ResumeParams, SERIAL_MONITOR_LISTEN,
    SERIAL_MONITOR_WRITE, SIM_PAUSE, SIM_RESTART, SIM_RESUME, SIM_START, SIM_STATUS, SimStartParams,
};

fn to_params(value: &impl serde::Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl<T: Transport> RpcEngine<T> {
    // ── File transfer ────────────────────────────────────────

    /// Store a file in the simulator.  Binary content travels base64-encoded.
    pub fn file_upload(&self, name: &str, content: impl Into<FileContent>) -> PendingCommand {
        let params = match content.into() {
            FileContent::Text(text) => json!({"name": name, "text": text}),
            FileContent::Binary(bytes) => json!({"name": name, "binary": base64::encode(&bytes)}),
        };
        self.send_command(FILE_UPLOAD, params)
    }

    /// Fetch a file from the simulator.
    pub fn file_download(&self, name: &str) -> impl Future<Output = Result<FileContent>> {
        let reply = self.send_command(FILE_DOWNLOAD, json!({"name": name}));
        async move { decode_file(&reply.await?) }
    }

    // ── Simulation control ───────────────────────────────────

    /// Start the simulation.  Run state flips before the acknowledgment
    /// (to Running, unless a paused start was requested).
    pub fn sim_start(&self, params: &SimStartParams) -> PendingCommand {
        self.shared.set_running(!params.pause);
        self.send_command(SIM_START, to_params(params))
    }

    pub fn sim_pause(&self) -> PendingCommand {
        self.send_command(SIM_PAUSE, Value::Null)
    }

    /// Resume simulated time, optionally pausing again after `pause_after`
    /// nanoseconds.  Run state becomes Running before the acknowledgment.
    pub fn sim_resume(&self, pause_after: Option<u64>) -> PendingCommand {
        self.shared.set_running(true);
        self.send_command(SIM_RESUME, to_params(&ResumeParams { pause_after }))
    }

    /// Restart the loaded firmware; `pause` leaves it stopped at time zero.
    pub fn sim_restart(&self, pause: bool) -> PendingCommand {
        self.send_command(SIM_RESTART, json!({"pause": pause}))
    }

    pub fn sim_status(&self) -> PendingCommand {
        self.send_command(SIM_STATUS, Value::Null)
    }

    // ── Serial monitor ───────────────────────────────────────

    /// Ask the simulator to emit `serial-monitor:data` events.
    pub fn serial_monitor_listen(&self) -> PendingCommand {
        self.send_command(SERIAL_MONITOR_LISTEN, Value::Null)
    }

    pub fn serial_monitor_write(&self, bytes: impl AsRef<[u8]>) -> PendingCommand {
        self.send_command(SERIAL_MONITOR_WRITE, json!({"bytes": bytes.as_ref()}))
    }

    // ── Peripherals ──────────────────────────────────────────

    pub fn framebuffer_read(&self, part_id: &str) -> PendingCommand {
        self.send_command(FRAMEBUFFER_READ, json!({"id": part_id}))
    }

    pub fn control_set(&self, part_id: &str, control: &str, value: f64) -> PendingCommand {
        let params = ControlSetParams {
            part: part_id,
            control,
            value,
        };
        self.send_command(CONTROL_SET, to_params(&params))
    }

    pub fn pin_read(&self, part_id: &str, pin: &str) -> PendingCommand {
        let params = PinReadParams { part: part_id, pin };
        self.send_command(PIN_READ, to_params(&params))
    }

    // ── Pause points ─────────────────────────────────────────

    /// Register a pause point and ask the simulator to honour it.
    ///
    /// With `auto_resume`, a stopped simulation is resumed in the same
    /// breath: the resume is issued without waiting for the add, and run
    /// state flips to Running at once.  The point is registered before
    /// anything is sent, so a pause racing ahead of the acknowledgments
    /// still fulfils it.  If the transport refuses the add, no resume is
    /// sent.
    pub fn add_pause_point(
        &self,
        condition: PauseCondition,
        auto_resume: bool,
    ) -> impl Future<Output = Result<PausePoint>> {
        let id = self.shared.next_pause_point_id(condition.kind());
        let params = condition.add_params(&id);
        let point = PausePoint::new(id, condition);
        self.shared.register_pause_point(point.clone());

        let add = self.send_command(PAUSE_POINT_ADD, params);
        // A refused add has already settled; resuming would run unguarded.
        let resume = (auto_resume && add.id().is_some() && !self.shared.is_running())
            .then(|| self.sim_resume(None));
        let shared = Rc::downgrade(&self.shared);

        async move {
            let acked = match resume {
                Some(resume) => try_zip(add, resume).await.map(|_| ()),
                None => add.await.map(|_| ()),
            };
            if let Err(e) = acked {
                debug!("RPC: pause point {} not armed: {}", point.id(), e);
                if let Some(shared) = shared.upgrade() {
                    shared.unregister_pause_point(point.id());
                }
                return Err(e);
            }
            Ok(point)
        }
    }

    /// Forget a pause point.  Returns `false`, without sending anything,
    /// if the id is not registered (never added, already fired, or
    /// already removed).
    pub async fn remove_pause_point(&self, id: &str) -> Result<bool> {
        if !self.shared.unregister_pause_point(id) {
            return Ok(false);
        }
        self.send_command(PAUSE_POINT_REMOVE, json!({"id": id}))
            .await?;
        Ok(true)
    }

    // ── Convenience waits ────────────────────────────────────

    /// Wait until simulated time reaches `nanos`.  Does not resume.
    pub async fn at_nanos(&self, nanos: u64) -> Result<Value> {
        let point = self
            .add_pause_point(PauseCondition::TimeAbsolute { nanos }, false)
            .await?;
        Ok(point.wait().await)
    }

    /// Let the simulation run for `nanos` of simulated time.
    pub async fn delay(&self, nanos: u64) -> Result<Value> {
        let point = self
            .add_pause_point(PauseCondition::TimeRelative { nanos }, true)
            .await?;
        Ok(point.wait().await)
    }

    /// Let the simulation run until its serial output contains `pattern`.
    pub async fn wait_for_serial_bytes(&self, pattern: impl AsRef<[u8]>) -> Result<Value> {
        let condition = PauseCondition::SerialBytes {
            bytes: pattern.as_ref().to_vec(),
        };
        let point = self.add_pause_point(condition, true).await?;
        Ok(point.wait().await)
    }
}

/// Decode a `file:download` result: `text` wins over `binary`.
fn decode_file(result: &Value) -> Result<FileContent> {
    if let Some(text) = result.get("text").and_then(Value::as_str) {
        return Ok(FileContent::Text(text.to_owned()));
    }
    if let Some(encoded) = result.get("binary").and_then(Value::as_str) {
        return base64::decode(encoded)
            .map(FileContent::Binary)
            .map_err(|e| ClientError::Validation(format!("invalid file download payload: {e}")));
    }
    Err(ClientError::Validation("Invalid file download response".into()))
}
