//! Resource Broker - Exclusive MMIO resource claims and mapping
//!
//! # Purpose
//! Owns the physical register windows handed to drivers: validates a
//! resource descriptor, reserves its physical range exclusively for one
//! consumer, and establishes a virtual mapping over it through a pluggable
//! backend. The mapping persists until the returned [`MappedRegion`] is
//! explicitly released.
//!
//! # Integration Points
//! - Depends on: a [`MappingBackend`] supplied by the platform (page-table
//!   mechanism, hypervisor call, or the RAM-backed [`MockBackend`])
//! - Provides to: device drivers that need a mapped register window
//!
//! # Architecture
//! A flat claim table guards exclusivity; the backend only sees ranges that
//! passed validation. Releasing takes the [`MappedRegion`] by value, so a
//! range that was never successfully mapped cannot be released.
//!
//! # Testing Strategy
//! - Unit tests: claim overlap, empty descriptors, backend exhaustion
//! - Integration tests: full claim/map/release cycles via the mock backend

use bitflags::bitflags;
use thiserror::Error;

mod mmio;
mod mock;

pub use mmio::MmioWindow;
pub use mock::MockBackend;

/// Error types for resource operations
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The requested physical range is already reserved by another consumer.
    #[error("physical range {base:#x}+{size:#x} is already claimed")]
    ResourceUnavailable { base: usize, size: usize },

    /// The virtual mapping could not be established.
    #[error("mmio mapping failed: {reason}")]
    MappingFailed { reason: String },
}

pub type Result<T> = core::result::Result<T, ResourceError>;

bitflags! {
    /// Access permissions requested from the mapping backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapPerms: u8 {
        /// Mapped range may be read.
        const READ = 1 << 0;
        /// Mapped range may be written.
        const WRITE = 1 << 1;
    }
}

/// Externally supplied description of a register window.
///
/// Read-only input; the broker never takes ownership of the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Physical base address of the window.
    pub base: usize,

    /// Window length in bytes.
    pub size: usize,
}

impl ResourceDescriptor {
    /// Create a new descriptor
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// A descriptor with no addressable bytes cannot be mapped.
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// A successfully claimed and mapped register window.
///
/// Proof of an exclusive reservation: it is only ever produced by
/// [`ResourceBroker::claim_and_map`] and consumed by
/// [`ResourceBroker::release`].
#[derive(Debug)]
pub struct MappedRegion {
    /// Virtual address where the window is mapped
    pub vaddr: usize,

    /// Physical address of the window
    pub paddr: usize,

    /// Size in bytes
    pub size: usize,
}

/// Mapping backend - establishes and tears down virtual mappings
///
/// Implemented by the platform's virtual-memory mechanism. The broker only
/// calls `map` with validated, unclaimed, non-empty ranges, and only calls
/// `unmap` with the exact range a prior `map` returned.
pub trait MappingBackend: Send {
    /// Map `size` bytes of physical memory starting at `paddr`.
    ///
    /// # Returns
    /// The virtual address of the mapping.
    ///
    /// # Errors
    /// Returns [`ResourceError::MappingFailed`] if the mapping cannot be
    /// established (exhausted address space, invalid physical range,
    /// permission failure).
    fn map(&mut self, paddr: usize, size: usize, perms: MapPerms) -> Result<usize>;

    /// Tear down a mapping previously returned by `map`.
    fn unmap(&mut self, vaddr: usize, size: usize);
}

/// An exclusive reservation of a physical range.
#[derive(Debug, Clone, Copy)]
struct Claim {
    base: usize,
    size: usize,
}

impl Claim {
    fn overlaps(&self, base: usize, size: usize) -> bool {
        self.base < base + size && base < self.base + self.size
    }
}

/// Resource broker - validates, reserves, and maps register windows
pub struct ResourceBroker {
    /// Mapping mechanism supplied by the platform
    backend: Box<dyn MappingBackend>,

    /// Outstanding exclusive claims
    claims: Vec<Claim>,
}

impl ResourceBroker {
    /// Create a broker over the given mapping backend
    pub fn new(backend: Box<dyn MappingBackend>) -> Self {
        Self {
            backend,
            claims: Vec::new(),
        }
    }

    /// Reserve a descriptor's physical range and map it.
    ///
    /// The reservation and mapping persist until [`release`](Self::release)
    /// is called with the returned region.
    ///
    /// # Errors
    /// - [`ResourceError::ResourceUnavailable`] if the range overlaps an
    ///   existing claim
    /// - [`ResourceError::MappingFailed`] if the descriptor is empty or the
    ///   backend cannot establish the mapping
    pub fn claim_and_map(&mut self, desc: &ResourceDescriptor) -> Result<MappedRegion> {
        if desc.is_empty() {
            return Err(ResourceError::MappingFailed {
                reason: format!("empty resource descriptor at {:#x}", desc.base),
            });
        }

        if self.claims.iter().any(|c| c.overlaps(desc.base, desc.size)) {
            return Err(ResourceError::ResourceUnavailable {
                base: desc.base,
                size: desc.size,
            });
        }

        // Device registers must never be cached or write-combined, so the
        // backend maps MMIO uncached; READ | WRITE matches the register
        // file semantics of every window the broker hands out.
        let vaddr = self
            .backend
            .map(desc.base, desc.size, MapPerms::READ | MapPerms::WRITE)?;

        self.claims.push(Claim {
            base: desc.base,
            size: desc.size,
        });

        log::debug!(
            "claimed {:#x}+{:#x}, mapped at {:#x}",
            desc.base,
            desc.size,
            vaddr
        );

        Ok(MappedRegion {
            vaddr,
            paddr: desc.base,
            size: desc.size,
        })
    }

    /// Release a mapped window: tear down the mapping and drop the claim.
    ///
    /// Consumes the region, so only a window that was successfully mapped
    /// can ever be released.
    pub fn release(&mut self, region: MappedRegion) {
        self.backend.unmap(region.vaddr, region.size);
        self.claims.retain(|c| c.base != region.paddr);

        log::debug!("released {:#x}+{:#x}", region.paddr, region.size);
    }

    /// Number of outstanding claims
    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }
}
