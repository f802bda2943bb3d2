//! LED Register Driver - single-register character device
//!
//! # Purpose
//! Binds LED register units reported by the platform enumeration layer,
//! maps each unit's one-byte register window, and publishes the unit as a
//! byte-stream endpoint. A read returns the current register value, a
//! write replaces it; exactly one byte moves per call.
//!
//! # Integration Points
//! - Depends on: resource-broker (exclusive window claims + mapping),
//!   chardev-registry (endpoint publication, user-copy transport)
//! - Provides to: the enumeration layer ([`BindingManager::on_bind`] /
//!   [`BindingManager::on_unbind`]) and endpoint callers (read/write
//!   dispatched through the registry)
//!
//! # Architecture
//! [`BindingManager`] reacts to bind/unbind events, owns the unit →
//! instance arena, and serializes lifecycle transitions. Each device
//! instance pairs one mapped register window with one published endpoint
//! and tears both down in reverse acquisition order. [`RegisterChannel`]
//! carries the one-byte transfer policy and nothing else.
//!
//! # Testing Strategy
//! - Unit tests: transfer policy against counting register cells,
//!   lifecycle transitions against the mock mapping backend
//! - Integration tests: full bind -> I/O -> unbind scenarios

use thiserror::Error;

use chardev_registry::RegistryError;
use resource_broker::ResourceError;

mod binding;
mod channel;
mod instance;

pub use binding::{BindingManager, COMPATIBLE, MAX_INSTANCES};
pub use channel::{MmioCell, RegisterCell, RegisterChannel};

/// Driver name; endpoint names derive from it, one per bound unit.
pub const DRIVER_NAME: &str = "ledreg";

/// Driver error types
#[derive(Debug, Error)]
pub enum DriverError {
    /// The instance's private state could not be allocated.
    #[error("could not allocate driver private state")]
    AllocationFailed,

    /// A bind event arrived for a unit that is already bound.
    #[error("unit '{0}' is already bound")]
    AlreadyBound(String),

    /// An unbind event arrived for a unit that is not bound.
    #[error("unit '{0}' is not bound")]
    NotBound(String),

    /// The event's compatibility identifier is not in [`COMPATIBLE`].
    #[error("compatibility id '{0}' does not match this driver")]
    NotCompatible(String),

    /// Resource reservation or mapping failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Endpoint publication or teardown failed.
    #[error(transparent)]
    Endpoint(#[from] RegistryError),
}

pub type Result<T> = core::result::Result<T, DriverError>;
