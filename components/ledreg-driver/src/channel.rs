//! Register Channel - byte-stream semantics over one mapped register
//!
//! The device models a single 8-bit cell, not a buffer: the channel never
//! aggregates register accesses, so a request of any non-zero length moves
//! exactly one byte.

use chardev_registry::{CharDevice, UserBuffer};
use resource_broker::{MappedRegion, MmioWindow};

/// One-byte register access primitive behind [`RegisterChannel`].
///
/// Production code uses [`MmioCell`]; tests substitute counting cells to
/// observe access patterns.
pub trait RegisterCell: Send + Sync {
    /// Load the register value.
    fn load(&self) -> u8;

    /// Store a value to the register.
    fn store(&self, value: u8);
}

/// Volatile cell over the register at the start of a mapped window.
pub struct MmioCell {
    window: MmioWindow,
}

impl MmioCell {
    /// Create a cell over the first byte of `region`.
    ///
    /// # Safety
    /// The region's mapping must outlive the cell. The device lifecycle
    /// guarantees this: the endpoint holding the cell is unpublished
    /// before the mapping is released.
    pub unsafe fn new(region: &MappedRegion) -> Self {
        Self {
            window: MmioWindow::new(region.vaddr, 1),
        }
    }
}

impl RegisterCell for MmioCell {
    fn load(&self) -> u8 {
        self.window.read_u8(0)
    }

    fn store(&self, value: u8) {
        self.window.write_u8(0, value)
    }
}

/// Byte-stream channel wrapping exactly one register.
///
/// Stateless beyond the cell: no buffering, no position tracking, no
/// blocking. Concurrent readers and writers interleave at single-byte
/// granularity, which is all the consistency one register needs.
pub struct RegisterChannel<C = MmioCell> {
    cell: C,
}

impl<C: RegisterCell> RegisterChannel<C> {
    /// Wrap a register cell
    pub fn new(cell: C) -> Self {
        Self { cell }
    }

    /// Single 8-bit load from the register. Never blocks.
    pub fn read_one(&self) -> u8 {
        self.cell.load()
    }

    /// Single 8-bit store to the register. Never blocks.
    pub fn write_one(&self, value: u8) {
        self.cell.store(value)
    }
}

impl<C: RegisterCell> CharDevice for RegisterChannel<C> {
    fn read(&self, buf: &mut dyn UserBuffer) -> usize {
        if buf.is_empty() {
            return 0;
        }

        let data = [self.read_one()];
        if buf.copy_out(&data) != 0 {
            // Caller's buffer was inaccessible; it will retry.
            return 0;
        }
        1
    }

    fn write(&self, buf: &mut dyn UserBuffer) -> usize {
        if buf.is_empty() {
            return 0;
        }

        let mut data = [0u8];
        if buf.copy_in(&mut data) != 0 {
            return 0;
        }
        self.write_one(data[0]);
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chardev_registry::SliceBuffer;
    use resource_broker::{MockBackend, ResourceBroker, ResourceDescriptor};
    use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Shared counters for a [`CountingCell`].
    #[derive(Default)]
    struct Counters {
        value: AtomicU8,
        loads: AtomicUsize,
        stores: AtomicUsize,
    }

    /// Register cell that counts every hardware access.
    struct CountingCell(Arc<Counters>);

    impl RegisterCell for CountingCell {
        fn load(&self) -> u8 {
            self.0.loads.fetch_add(1, Ordering::Relaxed);
            self.0.value.load(Ordering::Relaxed)
        }

        fn store(&self, value: u8) {
            self.0.stores.fetch_add(1, Ordering::Relaxed);
            self.0.value.store(value, Ordering::Relaxed);
        }
    }

    /// User buffer whose copies always fault.
    struct FaultyBuffer {
        len: usize,
    }

    impl UserBuffer for FaultyBuffer {
        fn len(&self) -> usize {
            self.len
        }

        fn copy_out(&mut self, src: &[u8]) -> usize {
            src.len()
        }

        fn copy_in(&mut self, dst: &mut [u8]) -> usize {
            dst.len()
        }
    }

    fn counting_channel() -> (RegisterChannel<CountingCell>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let channel = RegisterChannel::new(CountingCell(counters.clone()));
        (channel, counters)
    }

    #[test]
    fn test_roundtrip_through_mapped_register() {
        let mut broker = ResourceBroker::new(Box::new(MockBackend::new()));
        let region = broker
            .claim_and_map(&ResourceDescriptor::new(0x1000, 4))
            .unwrap();

        let channel = RegisterChannel::new(unsafe { MmioCell::new(&region) });
        channel.write_one(0xAB);
        assert_eq!(channel.read_one(), 0xAB);

        drop(channel);
        broker.release(region);
    }

    #[test]
    fn test_zero_length_request_touches_no_hardware() {
        let (channel, counters) = counting_channel();
        let mut empty = [];

        assert_eq!(channel.read(&mut SliceBuffer::new(&mut empty)), 0);
        assert_eq!(channel.write(&mut SliceBuffer::new(&mut empty)), 0);

        assert_eq!(counters.loads.load(Ordering::Relaxed), 0);
        assert_eq!(counters.stores.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_oversized_request_moves_one_byte() {
        let (channel, counters) = counting_channel();
        counters.value.store(0x5A, Ordering::Relaxed);

        let mut raw = [0u8; 8];
        assert_eq!(channel.read(&mut SliceBuffer::new(&mut raw)), 1);
        assert_eq!(raw[0], 0x5A);
        assert_eq!(raw[1..], [0u8; 7]);
        assert_eq!(counters.loads.load(Ordering::Relaxed), 1);

        let mut raw = [0x11u8, 0x22, 0x33];
        assert_eq!(channel.write(&mut SliceBuffer::new(&mut raw)), 1);
        assert_eq!(counters.stores.load(Ordering::Relaxed), 1);
        assert_eq!(channel.read_one(), 0x11);
    }

    #[test]
    fn test_read_transport_failure_reports_zero() {
        let (channel, counters) = counting_channel();

        // The register load has already happened when the copy faults.
        assert_eq!(channel.read(&mut FaultyBuffer { len: 1 }), 0);
        assert_eq!(counters.loads.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_write_transport_failure_skips_store() {
        let (channel, counters) = counting_channel();

        assert_eq!(channel.write(&mut FaultyBuffer { len: 1 }), 0);
        assert_eq!(counters.stores.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_open_close_always_succeed() {
        let (channel, _) = counting_channel();

        channel.open().unwrap();
        channel.open().unwrap();
        channel.release().unwrap();
        channel.release().unwrap();
    }
}
