pub mod backoff;
pub mod commands;
pub mod gate;
pub mod protocol;
pub mod screen;
pub mod session_manager;
pub mod status;

pub use backoff::Backoff;
pub use commands::{CommandDispatcher, RebootFacility, Responder, SystemReboot};
pub use gate::{DoneGate, StopReason};
pub use protocol::{CommandResponse, CommandStatus};
pub use screen::{parse_screen_list, ScreenControl, ScriptScreenControl};
pub use session_manager::{LinkExit, LinkSettings, SessionManager};
pub use status::{StatusPayload, StatusReporter};
