pub mod constants;
pub mod container;
pub mod envelope;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::Endpoint;
pub use container::{ContainerError, ContainerHeader, build_container};
pub use envelope::{DeviceRequest, DeviceResponse, Method, RequestBody};
pub use messages::{
    DeviceStatus, ReleaseCheckResponse, ReleaseProgress, SessionStartResponse,
    SessionStatusResponse,
};
