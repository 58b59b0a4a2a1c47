use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::time::{sleep, Duration, Instant};

use crate::device::constants::{BLINKY_SERVICE_UUID, SCAN_POLL_DELAY};
use crate::device::transport::{CharacteristicDescriptor, ServiceDescriptor, Transport, TransportEvent};
use crate::device::types::{ConnectOptions, ConnectionState, DeviceSelector};
use crate::error::DeviceError;

/// A Blinky found while scanning.
#[derive(Debug, Clone)]
pub struct FoundPeripheral {
    pub adapter: Adapter,
    pub peripheral: Peripheral,
    pub properties: PeripheralProperties,
}

impl FoundPeripheral {
    pub fn label(&self) -> String {
        format!(
            "{} {}",
            self.properties.address,
            self.properties.local_name.as_deref().unwrap_or("NONE"),
        )
    }
}

pub async fn start_scanning(manager: &Manager) -> Result<Vec<Adapter>, DeviceError> {
    let adapters = manager.adapters().await?;

    let filter = ScanFilter {
        services: vec![BLINKY_SERVICE_UUID],
    };

    for adapter in &adapters {
        info!("Scanning using adapter {}...", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
        adapter.start_scan(filter.clone()).await?;
    }

    Ok(adapters)
}

pub async fn stop_scanning(adapters: &[Adapter]) {
    for adapter in adapters {
        if let Err(err) = adapter.stop_scan().await {
            warn!("Failed to stop scanning: {}", err);
        }
    }
}

pub async fn find_peripherals(adapters: &[Adapter]) -> Vec<FoundPeripheral> {
    let mut found = Vec::new();

    for adapter in adapters {
        let peripherals = match adapter.peripherals().await {
            Ok(v) => v,
            Err(err) => {
                warn!("Failed to query BLE adapter for peripherals: {}", err);
                continue;
            },
        };

        for peripheral in peripherals {
            match peripheral.properties().await {
                Err(err) => {
                    warn!("Could not query peripheral for properties: {:?}", err);
                },
                Ok(None) => {
                    debug!("Peripheral has no properties");
                },
                Ok(Some(properties)) => {
                    // Some environments ignore the filter, so make sure to check the service uuid again
                    if properties.services.contains(&BLINKY_SERVICE_UUID) {
                        found.push(FoundPeripheral { adapter: adapter.clone(), peripheral, properties });
                    }
                },
            }
        }
    }

    found
}

/// Scans until a Blinky matching `selector` shows up, or `scan_timeout` has passed.
pub async fn find_blinky(manager: &Manager, selector: &DeviceSelector, scan_timeout: Duration) -> Result<FoundPeripheral, DeviceError> {
    let adapters = start_scanning(manager).await?;
    let deadline = Instant::now() + scan_timeout;

    let result = loop {
        let found = find_peripherals(&adapters).await.into_iter().find(|found| {
            selector.matches(&found.properties.address, found.properties.local_name.as_deref())
        });

        if let Some(found) = found {
            info!(
                "Using peripheral {} {:?} {} {:?}",
                found.properties.address,
                found.properties.address_type,
                found.properties.local_name.as_deref().unwrap_or("NONE"),
                found.properties.services,
            );
            break Ok(found);
        }

        if Instant::now() >= deadline {
            break Err(DeviceError::NotFound);
        }

        debug!("No peripherals matched {}", selector);
        sleep(Duration::from_millis(SCAN_POLL_DELAY)).await;
    };

    stop_scanning(&adapters).await;
    result
}

/// Scans for `scan_timeout` and returns every Blinky seen, deduplicated by address.
pub async fn scan_blinkies(manager: &Manager, scan_timeout: Duration) -> Result<Vec<FoundPeripheral>, DeviceError> {
    let adapters = start_scanning(manager).await?;
    sleep(scan_timeout).await;

    let mut found = find_peripherals(&adapters).await;
    found.sort_by_key(|found| found.properties.address);
    found.dedup_by_key(|found| found.properties.address);

    stop_scanning(&adapters).await;
    Ok(found)
}

/// [`Transport`] backed by btleplug.
pub struct BtleTransport {
    adapter: Adapter,
    peripheral: Peripheral,
}

impl BtleTransport {
    pub fn new(adapter: Adapter, peripheral: Peripheral) -> Self {
        BtleTransport { adapter, peripheral }
    }
}

impl From<FoundPeripheral> for BtleTransport {
    fn from(found: FoundPeripheral) -> Self {
        BtleTransport::new(found.adapter, found.peripheral)
    }
}

#[async_trait]
impl Transport for BtleTransport {
    type Handle = Characteristic;

    async fn connect(&self, options: &ConnectOptions) -> Result<(), DeviceError> {
        if options.auto_connect {
            debug!("btleplug always connects directly, ignoring autoConnect");
        }

        if self.peripheral.is_connected().await? {
            return Ok(());
        }

        self.peripheral.connect().await?;
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<ServiceDescriptor<Characteristic>>, DeviceError> {
        self.peripheral.discover_services().await?;

        let services = self.peripheral.services().into_iter().map(|service| {
            ServiceDescriptor {
                uuid: service.uuid,
                characteristics: service.characteristics.into_iter().map(|characteristic| {
                    CharacteristicDescriptor {
                        uuid: characteristic.uuid,
                        properties: characteristic.properties,
                        handle: characteristic,
                    }
                }).collect(),
            }
        }).collect();

        Ok(services)
    }

    async fn read(&self, characteristic: &Characteristic) -> Result<Vec<u8>, DeviceError> {
        Ok(self.peripheral.read(characteristic).await?)
    }

    async fn write(&self, characteristic: &Characteristic, value: &[u8]) -> Result<(), DeviceError> {
        self.peripheral.write(characteristic, value, WriteType::WithResponse).await?;
        Ok(())
    }

    async fn subscribe(&self, characteristic: &Characteristic) -> Result<BoxStream<'static, Vec<u8>>, DeviceError> {
        // obtain the stream first so that no notification sent right after subscribing is lost
        let notifications = self.peripheral.notifications().await?;
        info!("Subscribing to characteristic {:?} {:?}", characteristic.service_uuid, characteristic.uuid);
        self.peripheral.subscribe(characteristic).await?;

        let uuid = characteristic.uuid;
        let values = notifications.filter_map(move |notification| async move {
            if notification.uuid == uuid {
                Some(notification.value)
            } else {
                None
            }
        });

        Ok(values.boxed())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, TransportEvent>, DeviceError> {
        let events = self.adapter.events().await?;
        let id = self.peripheral.id();

        let events = events.filter_map(move |event| {
            let result = match event {
                CentralEvent::DeviceDisconnected(disconnected) if disconnected == id => {
                    Some(TransportEvent::StateChanged(ConnectionState::Disconnected))
                },
                _ => None,
            };
            async move { result }
        });

        Ok(events.boxed())
    }
}
