//! Mock Backend - RAM-backed mapping backend for tests and benches
//!
//! Stands in for the platform's virtual-memory mechanism: each "mapping"
//! is a heap allocation whose address doubles as the virtual address, so a
//! mapped register window behaves like real zero-initialized device memory
//! under [`MmioWindow`](crate::MmioWindow) accesses.

use crate::{MapPerms, MappingBackend, ResourceError, Result};

/// One live mock mapping. The boxed buffer keeps the backing bytes alive
/// (and their address stable) until `unmap`.
struct MockRegion {
    vaddr: usize,
    size: usize,
    _mem: Box<[u8]>,
}

/// RAM-backed mapping backend
pub struct MockBackend {
    regions: Vec<MockRegion>,

    /// Optional cap on total mapped bytes, to exercise exhaustion paths
    limit: Option<usize>,

    /// Bytes currently mapped
    in_use: usize,
}

impl MockBackend {
    /// Create a backend with unbounded address space
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            limit: None,
            in_use: 0,
        }
    }

    /// Create a backend that fails once `limit` total bytes are mapped
    pub fn with_limit(limit: usize) -> Self {
        Self {
            regions: Vec::new(),
            limit: Some(limit),
            in_use: 0,
        }
    }

    /// Number of live mappings
    pub fn mapped_count(&self) -> usize {
        self.regions.len()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingBackend for MockBackend {
    fn map(&mut self, paddr: usize, size: usize, _perms: MapPerms) -> Result<usize> {
        if let Some(limit) = self.limit {
            if self.in_use + size > limit {
                return Err(ResourceError::MappingFailed {
                    reason: format!("virtual address space exhausted mapping {paddr:#x}"),
                });
            }
        }

        let mem = vec![0u8; size].into_boxed_slice();
        let vaddr = mem.as_ptr() as usize;

        self.regions.push(MockRegion {
            vaddr,
            size,
            _mem: mem,
        });
        self.in_use += size;

        Ok(vaddr)
    }

    fn unmap(&mut self, vaddr: usize, size: usize) {
        if let Some(pos) = self.regions.iter().position(|r| r.vaddr == vaddr) {
            debug_assert_eq!(self.regions[pos].size, size);
            self.regions.remove(pos);
            self.in_use -= size;
        }
    }
}
