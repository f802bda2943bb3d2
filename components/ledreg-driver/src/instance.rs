//! Device Instance - one bound unit's resources and lifecycle
//!
//! An instance pairs one mapped register window with one published
//! endpoint. Construction acquires in order claim -> map -> publish; any
//! failure unwinds what was acquired so far in reverse, and teardown
//! always unpublishes before it releases the mapping.

use std::sync::Arc;

use chardev_registry::{DeviceRegistry, EndpointId};
use resource_broker::{MappedRegion, ResourceBroker, ResourceDescriptor};

use crate::channel::{MmioCell, RegisterChannel};
use crate::{Result, DRIVER_NAME};

/// Lifecycle states of a device instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindState {
    /// Resources are being acquired; the endpoint is not yet visible.
    Mapping,

    /// Mapping and publication both succeeded; the instance is bound.
    Published,
}

/// One bound hardware unit.
pub(crate) struct DeviceInstance {
    /// Hardware unit identifier from the enumeration layer
    unit: String,

    /// The claimed and mapped register window
    region: MappedRegion,

    /// Endpoint the unit is published under, once `Published`
    endpoint: Option<EndpointId>,

    state: BindState,
}

impl DeviceInstance {
    /// Bring a unit up: claim and map its register window, wrap the
    /// register in a channel, and publish the endpoint.
    ///
    /// # Errors
    /// Any failure unwinds everything acquired so far and surfaces the
    /// originating error unmodified; no partially constructed instance is
    /// ever returned.
    pub(crate) fn bind(
        unit: &str,
        desc: &ResourceDescriptor,
        broker: &mut ResourceBroker,
        registry: &DeviceRegistry,
    ) -> Result<Self> {
        // 1. Reserve and map the register window.
        let region = broker.claim_and_map(desc).map_err(|err| {
            log::error!("{unit}: could not map register window: {err}");
            err
        })?;

        // 2. Wrap the mapped register. The mapping outlives the endpoint
        //    because unbind unpublishes before releasing.
        let channel = Arc::new(RegisterChannel::new(unsafe { MmioCell::new(&region) }));

        let mut instance = Self {
            unit: unit.to_string(),
            region,
            endpoint: None,
            state: BindState::Mapping,
        };

        // 3. Publish the endpoint; only after this does the unit count as
        //    bound.
        let name = instance.endpoint_name();
        match registry.publish(&name, channel) {
            Ok(endpoint) => {
                instance.endpoint = Some(endpoint);
                instance.state = BindState::Published;
                log::info!(
                    "{unit}: bound, register at {:#x}, endpoint '{name}'",
                    instance.region.paddr
                );
                Ok(instance)
            }
            Err(err) => {
                log::error!("{unit}: could not publish endpoint '{name}': {err}");
                let Self { region, .. } = instance;
                broker.release(region);
                Err(err.into())
            }
        }
    }

    /// Tear the unit down in reverse acquisition order: unpublish first,
    /// so no new I/O can start, then release the mapping. An I/O call
    /// that already resolved the endpoint may finish against the mapping.
    pub(crate) fn unbind(
        self,
        broker: &mut ResourceBroker,
        registry: &DeviceRegistry,
    ) -> Result<()> {
        let Self {
            unit,
            region,
            endpoint,
            ..
        } = self;

        if let Some(endpoint) = endpoint {
            registry.unpublish(endpoint)?;
        }
        broker.release(region);

        log::info!("{unit}: unbound");
        Ok(())
    }

    pub(crate) fn unit(&self) -> &str {
        &self.unit
    }

    pub(crate) fn endpoint(&self) -> Option<EndpointId> {
        self.endpoint
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.state == BindState::Published
    }

    /// Stable per-unit endpoint name.
    fn endpoint_name(&self) -> String {
        format!("{DRIVER_NAME}-{}", self.unit)
    }
}
