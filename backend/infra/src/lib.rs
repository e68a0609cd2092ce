//! Infrastructure for the screenlink agent.
//!
//! Durable single-value state files (pairing code, paired descriptor) and
//! local device facts (network interfaces, uptime).

pub mod device_info;
pub mod paired_session_store;
pub mod pairing_code_store;
mod private_file;

pub use device_info::{
    InterfaceSource, StaticInterfaces, SysfsInterfaces, classify_interface, reportable, uptime_secs,
};
pub use paired_session_store::{PairedDescriptor, PairedSessionStore};
pub use pairing_code_store::PairingCodeStore;

use std::path::PathBuf;

/// Default directory for persisted agent state.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/screenlink";

/// Resolve a state directory from `var`, falling back to [`DEFAULT_STATE_DIR`].
pub fn state_dir_from_env(var: &str) -> PathBuf {
    match std::env::var(var) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_STATE_DIR),
    }
}
