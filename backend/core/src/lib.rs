pub mod error;
pub mod event;
pub mod types;

pub use error::{
    CipherError, DenyReason, KeyExchangeError, LinkError, PairingError, StoreError,
};
pub use event::{EventSink, LifecycleEvent, Observers};
pub use types::{InterfaceInfo, InterfaceKind};
