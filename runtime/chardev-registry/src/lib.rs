//! Character Device Registry - endpoint publication for byte-stream devices
//!
//! # Purpose
//! Provides the capability interface a character device implements
//! ([`CharDevice`]), the transport seam over which bytes cross to and from
//! the caller's address space ([`UserBuffer`]), and the publication table
//! that makes devices reachable under stable names ([`DeviceRegistry`]).
//!
//! # Integration Points
//! - Depends on: nothing below it; devices are handed in as `Arc<dyn
//!   CharDevice>`
//! - Provides to: drivers (publication) and the I/O dispatch layer that
//!   exposes endpoints as filesystem-visible nodes (lookup + read/write)
//!
//! # Architecture
//! Endpoint ids come from a bounded slot arena with free-slot reuse, the
//! moral equivalent of dynamic minor-number allocation. Publication and
//! lookup share one lock, so once `unpublish` returns no new I/O call can
//! reach the device; a call that already cloned the device handle is
//! allowed to finish.
//!
//! # Testing Strategy
//! - Unit tests: publish/unpublish, name collisions, id reuse, lookup
//! - Device behavior itself is tested where the devices live

use std::sync::Arc;

use thiserror::Error;

mod registry;

pub use registry::{DeviceRegistry, EndpointId, MAX_ENDPOINTS};

/// Error types for endpoint operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No endpoint is published under this id.
    #[error("no endpoint published under {0}")]
    EndpointNotFound(EndpointId),

    /// Another endpoint already uses this name.
    #[error("endpoint name '{0}' is already taken")]
    NameTaken(String),

    /// The endpoint table has no free slot left.
    #[error("endpoint table is full")]
    TableFull,
}

pub type Result<T> = core::result::Result<T, RegistryError>;

/// Transport for moving bytes between the caller's buffer and the device.
///
/// Mirrors the user-copy primitives of the surrounding system: `copy_out`
/// and `copy_in` return the number of bytes that could NOT be moved, so a
/// non-zero return means the caller's buffer was (partially) inaccessible.
pub trait UserBuffer {
    /// Number of bytes the caller asked to transfer.
    fn len(&self) -> usize;

    /// True if the caller asked for a zero-length transfer.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy bytes toward the caller. Returns the count NOT delivered.
    fn copy_out(&mut self, src: &[u8]) -> usize;

    /// Copy bytes from the caller. Returns the count NOT fetched.
    fn copy_in(&mut self, dst: &mut [u8]) -> usize;
}

/// [`UserBuffer`] over a plain in-process slice; the copy cannot fault.
pub struct SliceBuffer<'a> {
    data: &'a mut [u8],
}

impl<'a> SliceBuffer<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }
}

impl UserBuffer for SliceBuffer<'_> {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn copy_out(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.data.len());
        self.data[..n].copy_from_slice(&src[..n]);
        src.len() - n
    }

    fn copy_in(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.data.len());
        dst[..n].copy_from_slice(&self.data[..n]);
        dst.len() - n
    }
}

/// Capability interface implemented by a character device.
///
/// `read`/`write` report the number of bytes transferred and never fail
/// hard: a transfer the transport could not complete is reported as zero
/// bytes, and the caller is expected to retry.
pub trait CharDevice: Send + Sync {
    /// Called when a caller opens the endpoint. No exclusivity is
    /// enforced; concurrent openers are permitted.
    fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Called when a caller closes the endpoint.
    fn release(&self) -> Result<()> {
        Ok(())
    }

    /// Transfer bytes from the device toward the caller.
    fn read(&self, buf: &mut dyn UserBuffer) -> usize;

    /// Transfer bytes from the caller into the device.
    fn write(&self, buf: &mut dyn UserBuffer) -> usize;
}

/// Convenience alias for the handle form devices are published in.
pub type DeviceHandle = Arc<dyn CharDevice>;
