//! Binding Manager - drives instance creation and destruction
//!
//! The enumeration layer delivers bind/unbind events here. The manager
//! matches the event's compatibility identifier against the driver's
//! table, keeps the unit -> instance arena, and serializes all lifecycle
//! transitions behind one lock (single-flight). Endpoint I/O does not go
//! through that lock; it is dispatched by the registry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chardev_registry::{DeviceRegistry, EndpointId};
use resource_broker::{MappingBackend, ResourceBroker, ResourceDescriptor};

use crate::instance::DeviceInstance;
use crate::{DriverError, Result};

/// Compatibility identifiers this driver binds to.
pub const COMPATIBLE: &[&str] = &["xlnx,ledreg-1.0"];

/// Upper bound on concurrently bound units.
pub const MAX_INSTANCES: usize = 8;

/// Lifecycle state shared by all bind/unbind transitions.
struct Inner {
    /// Resource claims and mappings for every bound unit
    broker: ResourceBroker,

    /// Instance arena; a unit's slot is freed again on unbind
    instances: Vec<Option<DeviceInstance>>,
}

impl Inner {
    fn slot_of(&self, unit: &str) -> Option<usize> {
        self.instances
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|i| i.unit() == unit))
    }

    /// Allocate the private-state slot for a new instance.
    fn alloc_slot(&mut self) -> Result<usize> {
        if let Some(free) = self.instances.iter().position(Option::is_none) {
            return Ok(free);
        }
        if self.instances.len() < MAX_INSTANCES {
            self.instances.push(None);
            return Ok(self.instances.len() - 1);
        }
        Err(DriverError::AllocationFailed)
    }
}

/// Binding manager - one per driver
pub struct BindingManager {
    /// Publication table shared with the I/O dispatch layer
    registry: Arc<DeviceRegistry>,

    inner: Mutex<Inner>,
}

impl BindingManager {
    /// Create a manager over the platform's mapping backend and the
    /// shared endpoint registry.
    pub fn new(backend: Box<dyn MappingBackend>, registry: Arc<DeviceRegistry>) -> Self {
        Self {
            registry,
            inner: Mutex::new(Inner {
                broker: ResourceBroker::new(backend),
                instances: Vec::new(),
            }),
        }
    }

    /// True if this driver services the given compatibility identifier.
    pub fn matches(compat: &str) -> bool {
        COMPATIBLE.contains(&compat)
    }

    /// Handle a bind event for `unit`.
    ///
    /// # Errors
    /// - [`DriverError::NotCompatible`] if `compat` is not in the table
    /// - [`DriverError::AlreadyBound`] if the unit is already bound
    /// - [`DriverError::AllocationFailed`] if the instance arena is full
    /// - mapping and publication errors, propagated unchanged; every
    ///   failure leaves no partial state behind
    pub fn on_bind(
        &self,
        unit: &str,
        compat: &str,
        desc: &ResourceDescriptor,
    ) -> Result<()> {
        if !Self::matches(compat) {
            return Err(DriverError::NotCompatible(compat.to_string()));
        }

        let mut inner = self.lock();

        if inner.slot_of(unit).is_some() {
            return Err(DriverError::AlreadyBound(unit.to_string()));
        }

        // 1. Allocate the instance's private state.
        let slot = inner.alloc_slot().map_err(|err| {
            log::error!("{unit}: {err}");
            err
        })?;

        // 2. Map the window and publish the endpoint. On failure the
        //    instance has already unwound itself; the slot stays free.
        let instance = DeviceInstance::bind(unit, desc, &mut inner.broker, &self.registry)?;

        inner.instances[slot] = Some(instance);
        Ok(())
    }

    /// Handle an unbind event for `unit`.
    ///
    /// # Errors
    /// - [`DriverError::NotBound`] if the unit is not currently bound
    /// - teardown errors from the registry, propagated unchanged
    pub fn on_unbind(&self, unit: &str) -> Result<()> {
        let mut inner = self.lock();

        let slot = match inner.slot_of(unit) {
            Some(slot) => slot,
            None => return Err(DriverError::NotBound(unit.to_string())),
        };

        let instance = inner.instances[slot]
            .take()
            .ok_or_else(|| DriverError::NotBound(unit.to_string()))?;

        instance.unbind(&mut inner.broker, &self.registry)
    }

    /// True if `unit` is currently bound.
    pub fn is_bound(&self, unit: &str) -> bool {
        let inner = self.lock();
        inner
            .instances
            .iter()
            .flatten()
            .any(|i| i.unit() == unit && i.is_bound())
    }

    /// Endpoint a bound unit is published under.
    pub fn endpoint_of(&self, unit: &str) -> Option<EndpointId> {
        let inner = self.lock();
        let slot = inner.slot_of(unit)?;
        inner.instances[slot].as_ref().and_then(|i| i.endpoint())
    }

    /// Number of currently bound units
    pub fn bound_count(&self) -> usize {
        self.lock().instances.iter().flatten().count()
    }

    /// Number of outstanding resource claims
    pub fn claim_count(&self) -> usize {
        self.lock().broker.claim_count()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
