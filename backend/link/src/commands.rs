//! Controller command dispatch.
//!
//! Every command carries a `command_id` that is echoed in each response.
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use screenlink_core::LinkError;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{info, warn};

use crate::protocol::CommandResponse;
use crate::screen::ScreenControl;
use crate::status::StatusReporter;

pub const DEFAULT_REBOOT_DELAY: Duration = Duration::from_secs(1);

/// Where command responses go. The session's connection implements this.
pub trait Responder: Send + Sync {
    fn respond(&self, response: CommandResponse) -> Result<(), LinkError>;
}

#[async_trait]
pub trait RebootFacility: Send + Sync {
    async fn reboot(&self) -> Result<()>;
}

/// Invokes the OS `reboot` program.
#[derive(Debug, Clone)]
pub struct SystemReboot {
    program: String,
}

impl Default for SystemReboot {
    fn default() -> Self {
        Self {
            program: "reboot".into(),
        }
    }
}

#[async_trait]
impl RebootFacility for SystemReboot {
    async fn reboot(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .status()
            .await
            .with_context(|| format!("failed to run {}", self.program))?;
        anyhow::ensure!(status.success(), "{} exited with {}", self.program, status);
        Ok(())
    }
}

pub struct CommandDispatcher {
    disabled: bool,
    status: StatusReporter,
    screen: Arc<dyn ScreenControl>,
    reboot: Arc<dyn RebootFacility>,
    reboot_delay: Duration,
}

impl CommandDispatcher {
    pub fn new(
        status: StatusReporter,
        screen: Arc<dyn ScreenControl>,
        reboot: Arc<dyn RebootFacility>,
    ) -> Self {
        Self {
            disabled: false,
            status,
            screen,
            reboot,
            reboot_delay: DEFAULT_REBOOT_DELAY,
        }
    }

    pub fn with_commands_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Pause between acknowledging `reboot` and invoking the facility, so the
    /// acknowledgement reaches the wire first.
    pub fn with_reboot_delay(mut self, delay: Duration) -> Self {
        self.reboot_delay = delay;
        self
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    /// Handles one decrypted `command` message. Errors are only returned when a
    /// response could not be queued.
    pub async fn dispatch(&self, message: &Value, out: &dyn Responder) -> Result<(), LinkError> {
        let command = message.get("command").and_then(Value::as_str).unwrap_or("");
        let command_id = message
            .get("command_id")
            .and_then(Value::as_str)
            .unwrap_or("");

        if command_id.is_empty() {
            warn!(command, "[Commands] Rejecting command without command_id");
            return out.respond(CommandResponse::error("", command, "command_id missing"));
        }
        if command.is_empty() {
            return out.respond(CommandResponse::error(command_id, "", "command missing"));
        }
        if self.disabled {
            info!(command, command_id, "[Commands] Commands disabled, rejecting");
            return out.respond(CommandResponse::error(
                command_id,
                command,
                "commands are disabled on this device",
            ));
        }

        info!(command, command_id, "[Commands] Dispatching");
        let response = match command {
            "status" => {
                let payload = serde_json::to_value(self.status.payload()).ok();
                CommandResponse::success(command_id, command, payload)
            }
            "reboot" => {
                out.respond(CommandResponse::acknowledged(command_id, command))?;
                tokio::time::sleep(self.reboot_delay).await;
                match self.reboot.reboot().await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!(error = %e, "[Commands] Reboot failed");
                        CommandResponse::error(command_id, command, e.to_string())
                    }
                }
            }
            "screen_list" => match self.screen.list().await {
                Ok(screens) => {
                    CommandResponse::success(command_id, command, Some(json!({ "screens": screens })))
                }
                Err(e) => CommandResponse::error(command_id, command, e.to_string()),
            },
            "screen_switch" | "screen_reload" => match screen_id(message) {
                Err(code) => CommandResponse::error(command_id, command, code),
                Ok(id) => {
                    let outcome = if command == "screen_switch" {
                        self.screen.switch(&id).await
                    } else {
                        self.screen.reload(&id).await
                    };
                    match outcome {
                        Ok(output) => CommandResponse::success(
                            command_id,
                            command,
                            Some(json!({ "screen_id": id, "output": output })),
                        ),
                        Err(e) => CommandResponse::error(command_id, command, e.to_string()),
                    }
                }
            },
            other => CommandResponse::error(command_id, other, format!("unknown command: {other}")),
        };
        out.respond(response)
    }
}

/// `params.screen_id` as a string; numeric ids are accepted.
fn screen_id(message: &Value) -> Result<String, &'static str> {
    let params = message
        .get("params")
        .filter(|p| p.is_object())
        .ok_or("params_missing")?;
    let id = match params.get("screen_id") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        return Err("screen_id_missing");
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CommandStatus;
    use screenlink_infra::StaticInterfaces;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collected(Mutex<Vec<CommandResponse>>);

    impl Responder for Collected {
        fn respond(&self, response: CommandResponse) -> Result<(), LinkError> {
            self.0.lock().unwrap().push(response);
            Ok(())
        }
    }

    impl Collected {
        fn take(&self) -> Vec<CommandResponse> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct FakeScreens;

    #[async_trait]
    impl ScreenControl for FakeScreens {
        async fn list(&self) -> Result<Vec<String>> {
            Ok(vec!["HDMI-1".into(), "DP-2".into()])
        }
        async fn switch(&self, screen_id: &str) -> Result<String> {
            Ok(format!("switched to {screen_id}"))
        }
        async fn reload(&self, screen_id: &str) -> Result<String> {
            anyhow::bail!("cannot reload {screen_id}")
        }
    }

    #[derive(Default)]
    struct CountingReboot(AtomicUsize);

    #[async_trait]
    impl RebootFacility for CountingReboot {
        async fn reboot(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn dispatcher(reboot: Arc<CountingReboot>) -> CommandDispatcher {
        let status = StatusReporter::new("client-1", Arc::new(StaticInterfaces::default()))
            .with_uptime(|| 7);
        CommandDispatcher::new(status, Arc::new(FakeScreens), reboot)
            .with_reboot_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn status_command_returns_heartbeat_payload() {
        let out = Collected::default();
        dispatcher(Arc::default())
            .dispatch(&json!({"type": "command", "command": "status", "command_id": "c1"}), &out)
            .await
            .unwrap();

        let responses = out.take();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].command_id, "c1");
        assert_eq!(responses[0].status, CommandStatus::Success);
        assert_eq!(responses[0].result.as_ref().unwrap()["uptime"], 7);
    }

    #[tokio::test]
    async fn reboot_is_acknowledged_before_invoking_facility() {
        let reboot = Arc::new(CountingReboot::default());
        let out = Collected::default();
        dispatcher(reboot.clone())
            .dispatch(&json!({"command": "reboot", "command_id": "r1"}), &out)
            .await
            .unwrap();

        let responses = out.take();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, CommandStatus::Acknowledged);
        assert_eq!(reboot.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_commands_are_rejected() {
        let reboot = Arc::new(CountingReboot::default());
        let out = Collected::default();
        dispatcher(reboot.clone())
            .with_commands_disabled(true)
            .dispatch(&json!({"command": "reboot", "command_id": "r1"}), &out)
            .await
            .unwrap();

        let responses = out.take();
        assert_eq!(responses[0].status, CommandStatus::Error);
        assert_eq!(responses[0].command_id, "r1");
        assert_eq!(reboot.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_command_id_or_command_is_an_error() {
        let d = dispatcher(Arc::default());
        let out = Collected::default();
        d.dispatch(&json!({"command": "status"}), &out).await.unwrap();
        d.dispatch(&json!({"command_id": "x"}), &out).await.unwrap();

        let responses = out.take();
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.status == CommandStatus::Error));
        assert_eq!(responses[1].command_id, "x");
    }

    #[tokio::test]
    async fn screen_commands_validate_params() {
        let d = dispatcher(Arc::default());
        let out = Collected::default();
        d.dispatch(&json!({"command": "screen_switch", "command_id": "s1"}), &out)
            .await
            .unwrap();
        d.dispatch(
            &json!({"command": "screen_switch", "command_id": "s2", "params": {}}),
            &out,
        )
        .await
        .unwrap();
        d.dispatch(
            &json!({"command": "screen_switch", "command_id": "s3", "params": {"screen_id": 4}}),
            &out,
        )
        .await
        .unwrap();
        d.dispatch(
            &json!({"command": "screen_reload", "command_id": "s4", "params": {"screen_id": "4"}}),
            &out,
        )
        .await
        .unwrap();

        let responses = out.take();
        assert_eq!(responses[0].error.as_deref(), Some("params_missing"));
        assert_eq!(responses[1].error.as_deref(), Some("screen_id_missing"));
        assert_eq!(responses[2].status, CommandStatus::Success);
        assert_eq!(responses[2].result.as_ref().unwrap()["output"], "switched to 4");
        assert_eq!(responses[3].status, CommandStatus::Error);
        assert!(responses[3].error.as_ref().unwrap().contains("cannot reload 4"));
    }

    #[tokio::test]
    async fn screen_list_and_unknown_commands() {
        let d = dispatcher(Arc::default());
        let out = Collected::default();
        d.dispatch(&json!({"command": "screen_list", "command_id": "l1"}), &out)
            .await
            .unwrap();
        d.dispatch(&json!({"command": "self_destruct", "command_id": "u1"}), &out)
            .await
            .unwrap();

        let responses = out.take();
        assert_eq!(responses[0].result.as_ref().unwrap()["screens"], json!(["HDMI-1", "DP-2"]));
        assert_eq!(responses[1].status, CommandStatus::Error);
        assert!(responses[1].error.as_ref().unwrap().contains("self_destruct"));
    }
}
