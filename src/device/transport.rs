use std::fmt::Debug;
use async_trait::async_trait;
use btleplug::api::CharPropFlags;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::device::types::{ConnectOptions, ConnectionState};
use crate::error::DeviceError;

#[derive(Debug, Clone)]
pub struct CharacteristicDescriptor<H> {
    pub uuid: Uuid,
    pub properties: CharPropFlags,
    pub handle: H,
}

/// A discovered GATT service. Characteristics are kept in discovery order.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor<H> {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicDescriptor<H>>,
}

impl<H> ServiceDescriptor<H> {
    /// The first characteristic with the given uuid that supports all of `required`.
    pub fn characteristic(&self, uuid: Uuid, required: CharPropFlags) -> Option<&CharacteristicDescriptor<H>> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid && c.properties.contains(required))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    StateChanged(ConnectionState),
    /// The peripheral's service set changed, every resolved handle is stale.
    ServicesInvalidated,
}

/// The link to one peripheral. Implementations own the GATT operation queue.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opaque reference to a characteristic, resolved during service discovery.
    type Handle: Clone + Debug + Send + Sync + 'static;

    /// A single connection attempt. Retrying is up to the caller.
    async fn connect(&self, options: &ConnectOptions) -> Result<(), DeviceError>;

    async fn discover_services(&self) -> Result<Vec<ServiceDescriptor<Self::Handle>>, DeviceError>;

    async fn read(&self, characteristic: &Self::Handle) -> Result<Vec<u8>, DeviceError>;

    /// Acknowledged write; resolves once the peripheral has confirmed it.
    async fn write(&self, characteristic: &Self::Handle, value: &[u8]) -> Result<(), DeviceError>;

    /// Enables notifications and returns the values pushed by the peripheral.
    async fn subscribe(&self, characteristic: &Self::Handle) -> Result<BoxStream<'static, Vec<u8>>, DeviceError>;

    async fn disconnect(&self) -> Result<(), DeviceError>;

    async fn events(&self) -> Result<BoxStream<'static, TransportEvent>, DeviceError>;
}
