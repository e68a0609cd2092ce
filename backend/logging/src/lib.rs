//! Structured logging for the screenlink agent.
//!
//! Handles log redaction, console plus rolling NDJSON output, and lifecycle event logging.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{LifecycleLogEntry, LifecycleLogger};
pub use logger::init_logger;
pub use redact::{redact_code, redact_secrets};
