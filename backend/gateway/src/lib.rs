//! Pairing HTTP API for the screenlink agent.
//!
//! Issues and confirms pairing codes over `POST /pair` and `POST /pair/confirm`.

pub mod client_ip;
pub mod error;
pub mod server;

pub use client_ip::{ClientIp, resolve_client_ip};
pub use error::ApiError;
pub use server::{PairingState, router, run_pairing_server, serve};
