//! In-memory [`Transport`] standing in for a Blinky peripheral.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use async_trait::async_trait;
use btleplug::api::CharPropFlags;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::time::{sleep, Duration};

use blinky::device::constants::{BLINKY_BUTTON_CHARACTERISTIC_UUID, BLINKY_LED_CHARACTERISTIC_UUID, BLINKY_SERVICE_UUID};
use blinky::device::transport::{CharacteristicDescriptor, ServiceDescriptor, Transport, TransportEvent};
use blinky::device::types::{ConnectOptions, ConnectionState};
use blinky::error::DeviceError;

pub type Handle = u16;

pub const BUTTON: Handle = 0x0E;
pub const LED: Handle = 0x10;

pub fn characteristic(uuid: uuid::Uuid, properties: CharPropFlags, handle: Handle) -> CharacteristicDescriptor<Handle> {
    CharacteristicDescriptor { uuid, properties, handle }
}

pub fn button(handle: Handle) -> CharacteristicDescriptor<Handle> {
    characteristic(BLINKY_BUTTON_CHARACTERISTIC_UUID, CharPropFlags::READ | CharPropFlags::NOTIFY, handle)
}

pub fn led(handle: Handle) -> CharacteristicDescriptor<Handle> {
    characteristic(BLINKY_LED_CHARACTERISTIC_UUID, CharPropFlags::READ | CharPropFlags::WRITE, handle)
}

pub fn lbs(characteristics: Vec<CharacteristicDescriptor<Handle>>) -> Vec<ServiceDescriptor<Handle>> {
    vec![ServiceDescriptor { uuid: BLINKY_SERVICE_UUID, characteristics }]
}

/// The layout of the nRF Blinky firmware: one button and one LED characteristic.
pub fn blinky_services() -> Vec<ServiceDescriptor<Handle>> {
    lbs(vec![button(BUTTON), led(LED)])
}

fn not_connected() -> DeviceError {
    DeviceError::Btle { source: btleplug::Error::NotConnected }
}

#[derive(Default)]
pub struct MockState {
    pub connect_failures: u32,
    pub connect_delay: Option<Duration>,
    pub fail_writes: bool,
    /// Every event stream starts with the link already gone.
    pub drop_link_on_events: bool,
    pub services: Vec<ServiceDescriptor<Handle>>,
    pub values: HashMap<Handle, Vec<u8>>,
    pub writes: Vec<(Handle, Vec<u8>)>,
    pub connect_attempts: u32,
    pub discoveries: u32,
    pub reads: u32,
    pub disconnects: u32,
    subscribers: HashMap<Handle, Vec<UnboundedSender<Vec<u8>>>>,
    listeners: Vec<UnboundedSender<TransportEvent>>,
}

pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new(services: Vec<ServiceDescriptor<Handle>>) -> Self {
        let state = MockState {
            services,
            values: HashMap::from([(BUTTON, vec![0x00]), (LED, vec![0x00])]),
            ..MockState::default()
        };

        MockTransport { state: Mutex::new(state) }
    }

    pub fn blinky() -> Self {
        MockTransport::new(blinky_services())
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_value(&self, handle: Handle, value: &[u8]) {
        self.state().values.insert(handle, value.to_vec());
    }

    /// Pushes a notification to every live subscriber of `handle`, returns how many got it.
    pub fn notify(&self, handle: Handle, value: &[u8]) -> usize {
        let mut state = self.state();
        let subscribers = state.subscribers.entry(handle).or_default();
        subscribers.retain(|subscriber| subscriber.unbounded_send(value.to_vec()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self, handle: Handle) -> usize {
        self.state()
            .subscribers
            .get(&handle)
            .map(|subscribers| subscribers.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn emit(&self, event: TransportEvent) {
        self.state().listeners.retain(|listener| listener.unbounded_send(event).is_ok());
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Handle = Handle;

    async fn connect(&self, _options: &ConnectOptions) -> Result<(), DeviceError> {
        let delay = {
            let mut state = self.state();
            state.connect_attempts += 1;
            state.connect_delay
        };

        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let mut state = self.state();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(not_connected());
        }

        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<ServiceDescriptor<Handle>>, DeviceError> {
        let mut state = self.state();
        state.discoveries += 1;
        Ok(state.services.clone())
    }

    async fn read(&self, characteristic: &Handle) -> Result<Vec<u8>, DeviceError> {
        let mut state = self.state();
        state.reads += 1;
        state.values.get(characteristic).cloned().ok_or_else(not_connected)
    }

    async fn write(&self, characteristic: &Handle, value: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(not_connected());
        }

        state.writes.push((*characteristic, value.to_vec()));
        state.values.insert(*characteristic, value.to_vec());
        Ok(())
    }

    async fn subscribe(&self, characteristic: &Handle) -> Result<BoxStream<'static, Vec<u8>>, DeviceError> {
        let (tx, rx) = unbounded();
        self.state().subscribers.entry(*characteristic).or_default().push(tx);
        Ok(rx.boxed())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        self.state().disconnects += 1;
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, TransportEvent>, DeviceError> {
        let (tx, rx) = unbounded();
        let mut state = self.state();
        if state.drop_link_on_events {
            let _ = tx.unbounded_send(TransportEvent::StateChanged(ConnectionState::Disconnected));
        }
        state.listeners.push(tx);
        Ok(rx.boxed())
    }
}

/// Polls `condition` while letting the session's background tasks run.
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(1)).await;
    }

    panic!("condition not met in time");
}
