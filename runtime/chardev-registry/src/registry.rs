//! Device Registry - the endpoint publication table
//!
//! Maps dynamically allocated endpoint ids to published devices. The slot
//! arena reuses freed slots, so long-running systems do not leak id space.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::{DeviceHandle, RegistryError, Result, UserBuffer};

/// Upper bound on simultaneously published endpoints.
pub const MAX_ENDPOINTS: usize = 256;

/// Handle under which a published device is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(u32);

impl EndpointId {
    /// Raw id value, for embedding in external node names.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep{}", self.0)
    }
}

/// One published endpoint.
struct Entry {
    name: String,
    dev: DeviceHandle,
}

/// Endpoint publication table
///
/// `read`/`write`/`open`/`close` resolve the id and clone the device
/// handle under the table lock, then run the device operation outside it,
/// so endpoint I/O from multiple threads is never serialized against other
/// I/O. `unpublish` removes the entry under the same lock: once it
/// returns, no new operation can reach the device.
pub struct DeviceRegistry {
    slots: RwLock<Vec<Option<Entry>>>,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Publish a device under a stable name.
    ///
    /// # Returns
    /// The endpoint id allocated for the device.
    ///
    /// # Errors
    /// - [`RegistryError::NameTaken`] if the name is already published
    /// - [`RegistryError::TableFull`] if all endpoint slots are in use
    pub fn publish(&self, name: &str, dev: DeviceHandle) -> Result<EndpointId> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);

        if slots
            .iter()
            .flatten()
            .any(|entry| entry.name == name)
        {
            return Err(RegistryError::NameTaken(name.to_string()));
        }

        let entry = Entry {
            name: name.to_string(),
            dev,
        };

        let slot = match slots.iter().position(Option::is_none) {
            Some(free) => {
                slots[free] = Some(entry);
                free
            }
            None if slots.len() < MAX_ENDPOINTS => {
                slots.push(Some(entry));
                slots.len() - 1
            }
            None => return Err(RegistryError::TableFull),
        };

        let id = EndpointId(slot as u32);
        log::info!("published endpoint '{name}' as {id}");
        Ok(id)
    }

    /// Unpublish an endpoint and hand its device back.
    ///
    /// After this returns, no new `open`/`read`/`write` can reach the
    /// device; an operation that already resolved its handle may finish.
    pub fn unpublish(&self, id: EndpointId) -> Result<DeviceHandle> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);

        let entry = slots
            .get_mut(id.0 as usize)
            .and_then(Option::take)
            .ok_or(RegistryError::EndpointNotFound(id))?;

        log::info!("unpublished endpoint '{}' ({id})", entry.name);
        Ok(entry.dev)
    }

    /// Find the endpoint published under `name`.
    pub fn lookup(&self, name: &str) -> Option<EndpointId> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);

        slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|e| e.name == name))
            .map(|slot| EndpointId(slot as u32))
    }

    /// Open the endpoint. Multiple concurrent openers are permitted.
    pub fn open(&self, id: EndpointId) -> Result<()> {
        self.device(id)?.open()
    }

    /// Close the endpoint.
    pub fn close(&self, id: EndpointId) -> Result<()> {
        self.device(id)?.release()
    }

    /// Read from the endpoint.
    ///
    /// # Returns
    /// Bytes transferred, as reported by the device.
    pub fn read(&self, id: EndpointId, buf: &mut dyn UserBuffer) -> Result<usize> {
        let dev = self.device(id)?;
        Ok(dev.read(buf))
    }

    /// Write to the endpoint.
    ///
    /// # Returns
    /// Bytes transferred, as reported by the device.
    pub fn write(&self, id: EndpointId, buf: &mut dyn UserBuffer) -> Result<usize> {
        let dev = self.device(id)?;
        Ok(dev.write(buf))
    }

    /// Number of currently published endpoints
    pub fn endpoint_count(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.iter().flatten().count()
    }

    /// Resolve an id to its device handle.
    fn device(&self, id: EndpointId) -> Result<DeviceHandle> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);

        slots
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .map(|entry| entry.dev.clone())
            .ok_or(RegistryError::EndpointNotFound(id))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CharDevice, SliceBuffer};
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;

    /// One-byte latch standing in for a real device.
    struct LatchDevice {
        byte: AtomicU8,
    }

    impl LatchDevice {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                byte: AtomicU8::new(0),
            })
        }
    }

    impl CharDevice for LatchDevice {
        fn read(&self, buf: &mut dyn UserBuffer) -> usize {
            let data = [self.byte.load(Ordering::Relaxed)];
            if buf.is_empty() || buf.copy_out(&data) != 0 {
                return 0;
            }
            1
        }

        fn write(&self, buf: &mut dyn UserBuffer) -> usize {
            let mut data = [0u8];
            if buf.is_empty() || buf.copy_in(&mut data) != 0 {
                return 0;
            }
            self.byte.store(data[0], Ordering::Relaxed);
            1
        }
    }

    #[test]
    fn test_publish_and_lookup() {
        let registry = DeviceRegistry::new();
        let id = registry.publish("latch0", LatchDevice::new()).unwrap();

        assert_eq!(registry.lookup("latch0"), Some(id));
        assert_eq!(registry.lookup("latch1"), None);
        assert_eq!(registry.endpoint_count(), 1);
    }

    #[test]
    fn test_read_write_roundtrip() {
        let registry = DeviceRegistry::new();
        let id = registry.publish("latch0", LatchDevice::new()).unwrap();

        registry.open(id).unwrap();

        let mut wbuf = [0xABu8];
        assert_eq!(registry.write(id, &mut SliceBuffer::new(&mut wbuf)).unwrap(), 1);

        let mut rbuf = [0u8];
        assert_eq!(registry.read(id, &mut SliceBuffer::new(&mut rbuf)).unwrap(), 1);
        assert_eq!(rbuf[0], 0xAB);

        registry.close(id).unwrap();
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = DeviceRegistry::new();
        registry.publish("latch0", LatchDevice::new()).unwrap();

        let result = registry.publish("latch0", LatchDevice::new());
        assert!(matches!(result, Err(RegistryError::NameTaken(_))));
        assert_eq!(registry.endpoint_count(), 1);
    }

    #[test]
    fn test_unpublish_stops_new_io() {
        let registry = DeviceRegistry::new();
        let id = registry.publish("latch0", LatchDevice::new()).unwrap();

        registry.unpublish(id).unwrap();

        let mut raw = [0u8];
        let result = registry.read(id, &mut SliceBuffer::new(&mut raw));
        assert!(matches!(result, Err(RegistryError::EndpointNotFound(_))));
        assert!(matches!(
            registry.open(id),
            Err(RegistryError::EndpointNotFound(_))
        ));
        assert_eq!(registry.endpoint_count(), 0);
    }

    #[test]
    fn test_unpublish_twice_rejected() {
        let registry = DeviceRegistry::new();
        let id = registry.publish("latch0", LatchDevice::new()).unwrap();

        registry.unpublish(id).unwrap();
        assert!(matches!(
            registry.unpublish(id),
            Err(RegistryError::EndpointNotFound(_))
        ));
    }

    #[test]
    fn test_slot_reuse() {
        let registry = DeviceRegistry::new();

        let a = registry.publish("latch0", LatchDevice::new()).unwrap();
        let _b = registry.publish("latch1", LatchDevice::new()).unwrap();

        registry.unpublish(a).unwrap();
        let c = registry.publish("latch2", LatchDevice::new()).unwrap();

        // The freed slot is handed out again.
        assert_eq!(c, a);
    }

    #[test]
    fn test_table_full() {
        let registry = DeviceRegistry::new();

        for i in 0..MAX_ENDPOINTS {
            registry
                .publish(&format!("latch{i}"), LatchDevice::new())
                .unwrap();
        }

        let result = registry.publish("overflow", LatchDevice::new());
        assert!(matches!(result, Err(RegistryError::TableFull)));
    }

    #[test]
    fn test_inflight_handle_survives_unpublish() {
        let registry = DeviceRegistry::new();
        let dev = LatchDevice::new();
        let id = registry.publish("latch0", dev.clone()).unwrap();

        // A caller that resolved its handle before unpublication may
        // still finish its operation.
        let inflight: DeviceHandle = dev;
        registry.unpublish(id).unwrap();

        let mut raw = [0u8];
        assert_eq!(inflight.read(&mut SliceBuffer::new(&mut raw)), 1);
    }
}
