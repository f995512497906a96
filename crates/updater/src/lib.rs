//! Resumable firmware update flow for a device reachable over HTTP.
//!
//! This crate implements the **business logic** for pushing a dual-image
//! container to a device. It is a library crate with no HTTP dependency:
//! the caller provides a [`DeviceConnection`] that performs single
//! request/response round-trips.
//!
//! # Pipeline
//!
//! 1. **Negotiate**: open (or rediscover) the device-side upload session
//! 2. **Transfer**: write fixed-size chunks by byte offset, reconciling
//!    with the device's reported progress after any failure
//! 3. **Finalize**: ask the device to validate and apply the container
//!
//! Release updates (the device downloads the image itself) and the
//! connection indicator are small request/response flows on the same
//! connection.

pub mod connection;
pub mod driver;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod release;
pub mod session;
pub mod status;
pub mod types;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

// Re-export primary types for convenience.
pub use connection::DeviceConnection;
pub use driver::{ChunkDriver, DriverStats};
pub use error::{DeviceError, TransportError, UpdateError};
pub use events::UpdateEvent;
pub use finalizer::{FinalizeOutcome, Finalizer, SessionProbe};
pub use release::{
    ReleaseInfo, ReleasePoller, check_release, fetch_release_progress, start_release_update,
};
pub use session::SessionNegotiator;
pub use status::{ConnectionIndicator, StatusPoller, fetch_status};
pub use types::{UpdateConfig, UpdateSummary};
pub use update::OtaUpdate;
