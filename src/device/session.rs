use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use btleplug::api::CharPropFlags;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

use crate::device::constants::{BLINKY_BUTTON_CHARACTERISTIC_UUID, BLINKY_LED_CHARACTERISTIC_UUID, BLINKY_SERVICE_UUID, WRITE_DEADLINE};
use crate::device::observable::StateCell;
use crate::device::protocol::{decode_state, encode_state};
use crate::device::transport::{ServiceDescriptor, Transport, TransportEvent};
use crate::device::types::{BlinkyState, Button, ConnectOptions, ConnectionState, Led};
use crate::error::DeviceError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn on_off(state: bool) -> &'static str {
    if state { "on" } else { "off" }
}

/// The four characteristics a Blinky must expose.
#[derive(Debug, Clone)]
pub struct CharacteristicHandles<H> {
    pub led1: H,
    pub led2: H,
    pub button1: H,
    pub button2: H,
}

impl<H: Clone> CharacteristicHandles<H> {
    /// LED1/LED2 (and Button1/Button2) share a characteristic uuid, so each lookup binds the
    /// first characteristic in discovery order that has the uuid and the required property.
    pub fn resolve(services: &[ServiceDescriptor<H>]) -> Option<Self> {
        let service = services.iter().find(|service| service.uuid == BLINKY_SERVICE_UUID)?;

        let led1 = service.characteristic(BLINKY_LED_CHARACTERISTIC_UUID, CharPropFlags::WRITE)?;
        let led2 = service.characteristic(BLINKY_LED_CHARACTERISTIC_UUID, CharPropFlags::WRITE)?;
        let button1 = service.characteristic(BLINKY_BUTTON_CHARACTERISTIC_UUID, CharPropFlags::NOTIFY)?;
        let button2 = service.characteristic(BLINKY_BUTTON_CHARACTERISTIC_UUID, CharPropFlags::NOTIFY)?;

        Some(CharacteristicHandles {
            led1: led1.handle.clone(),
            led2: led2.handle.clone(),
            button1: button1.handle.clone(),
            button2: button2.handle.clone(),
        })
    }

    pub fn led(&self, led: Led) -> &H {
        match led {
            Led::Led1 => &self.led1,
            Led::Led2 => &self.led2,
        }
    }

    pub fn button(&self, button: Button) -> &H {
        match button {
            Button::Button1 => &self.button1,
            Button::Button2 => &self.button2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Observed {
    Led(Led),
    Button(Button),
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Led(led) => write!(f, "{}", led),
            Observed::Button(button) => write!(f, "{}", button),
        }
    }
}

/// State shared between a session and its background tasks.
struct Shared<H> {
    // held while cancelling a scope and while a scope-guarded write checks that scope
    transition: Mutex<()>,
    handles: Mutex<Option<CharacteristicHandles<H>>>,
    connection: StateCell<ConnectionState>,
    state: StateCell<BlinkyState>,
    led1: StateCell<bool>,
    led2: StateCell<bool>,
    button1: StateCell<bool>,
    button2: StateCell<bool>,
}

impl<H: Clone> Shared<H> {
    fn new() -> Self {
        Shared {
            transition: Mutex::new(()),
            handles: Mutex::new(None),
            connection: StateCell::new(ConnectionState::Disconnected),
            state: StateCell::new(BlinkyState::NotAvailable),
            led1: StateCell::default(),
            led2: StateCell::default(),
            button1: StateCell::default(),
            button2: StateCell::default(),
        }
    }

    fn cell(&self, observed: Observed) -> &StateCell<bool> {
        match observed {
            Observed::Led(Led::Led1) => &self.led1,
            Observed::Led(Led::Led2) => &self.led2,
            Observed::Button(Button::Button1) => &self.button1,
            Observed::Button(Button::Button2) => &self.button2,
        }
    }

    fn set_connection(&self, state: ConnectionState) {
        if self.connection.set(state) {
            debug!("Connection state: {:?}", state);
        }
        self.state.set(BlinkyState::from(state));
    }

    fn handles(&self) -> Option<CharacteristicHandles<H>> {
        lock(&self.handles).clone()
    }

    fn invalidate(&self) {
        lock(&self.handles).take();
    }

    /// Cancels `scope` so that no guarded write can still land after this returns.
    fn cancel(&self, scope: &CancellationToken) {
        let _transition = lock(&self.transition);
        scope.cancel();
    }

    /// Sets `observed` unless `scope` has been cancelled.
    fn set_guarded(&self, scope: &CancellationToken, observed: Observed, state: bool) -> bool {
        let _transition = lock(&self.transition);
        if scope.is_cancelled() {
            return false;
        }

        self.cell(observed).set(state);
        true
    }

    // Background writes are dropped once their scope has been cancelled.
    fn apply(&self, scope: &CancellationToken, observed: Observed, value: &[u8]) {
        match decode_state(value) {
            Ok(state) => {
                self.set_guarded(scope, observed, state);
            },
            Err(err) => warn!("Ignoring value received for {}: {}", observed, err),
        }
    }

    fn link_lost(&self, link: &CancellationToken) {
        let _transition = lock(&self.transition);
        self.invalidate();
        link.cancel();
        self.set_connection(ConnectionState::Disconnected);
    }

    /// Publishes Ready, unless the link was lost while it was being set up.
    fn publish_ready(&self, link: &CancellationToken) -> bool {
        let _transition = lock(&self.transition);
        if link.is_cancelled() {
            return false;
        }

        self.set_connection(ConnectionState::Ready);
        true
    }
}

/// A connection to one Blinky peripheral.
///
/// The session publishes the connection state, both LEDs and both buttons as observable values.
/// Every command fails with [`DeviceError::Released`] once [`DeviceSession::release`] has been
/// called.
pub struct DeviceSession<T: Transport> {
    transport: Arc<T>,
    options: ConnectOptions,
    shared: Arc<Shared<T::Handle>>,
    cancel: CancellationToken,
    link_cancel: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    released: AtomicBool,
}

impl<T: Transport> DeviceSession<T> {
    pub fn new(transport: Arc<T>, options: ConnectOptions) -> Self {
        let cancel = CancellationToken::new();
        let link_cancel = cancel.child_token();

        DeviceSession {
            transport,
            options,
            shared: Arc::new(Shared::new()),
            cancel,
            link_cancel: Mutex::new(link_cancel),
            tasks: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection.subscribe()
    }

    pub fn current_connection_state(&self) -> ConnectionState {
        self.shared.connection.get()
    }

    pub fn state(&self) -> watch::Receiver<BlinkyState> {
        self.shared.state.subscribe()
    }

    pub fn led(&self, led: Led) -> watch::Receiver<bool> {
        self.shared.cell(Observed::Led(led)).subscribe()
    }

    pub fn button(&self, button: Button) -> watch::Receiver<bool> {
        self.shared.cell(Observed::Button(button)).subscribe()
    }

    pub fn led1(&self) -> watch::Receiver<bool> {
        self.led(Led::Led1)
    }

    pub fn led2(&self) -> watch::Receiver<bool> {
        self.led(Led::Led2)
    }

    pub fn button1(&self) -> watch::Receiver<bool> {
        self.button(Button::Button1)
    }

    pub fn button2(&self) -> watch::Receiver<bool> {
        self.button(Button::Button2)
    }

    /// Every connection state change made after this call, none merged.
    pub fn connection_transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.shared.connection.transitions()
    }

    pub fn led_transitions(&self, led: Led) -> broadcast::Receiver<bool> {
        self.shared.cell(Observed::Led(led)).transitions()
    }

    pub fn button_transitions(&self, button: Button) -> broadcast::Receiver<bool> {
        self.shared.cell(Observed::Button(button)).transitions()
    }

    pub fn has_capabilities(&self) -> bool {
        lock(&self.shared.handles).is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn check_released(&self) -> Result<(), DeviceError> {
        match self.is_released() {
            true => Err(DeviceError::Released),
            false => Ok(()),
        }
    }

    /// Connects, validates the services and starts observing the buttons.
    ///
    /// Suspends until the session is ready, or until connecting failed, timed out or the session
    /// was released. On failure the session is left `Disconnected` and `connect` may be called
    /// again, unless the error is [`DeviceError::Unsupported`].
    pub async fn connect(&self) -> Result<(), DeviceError> {
        self.check_released()?;

        if self.shared.connection.get() == ConnectionState::Ready {
            return Ok(());
        }

        self.shared.set_connection(ConnectionState::Connecting);

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(DeviceError::Released),
            result = self.establish() => result,
        };

        if let Err(err) = &result {
            match err {
                DeviceError::Released => info!("Connection attempt cancelled"),
                _ => warn!("Connecting to peripheral failed: {}", err),
            }

            self.abandon_link().await;
            self.shared.set_connection(ConnectionState::Disconnected);
        }

        result
    }

    async fn establish(&self) -> Result<(), DeviceError> {
        let millis = self.options.timeout_ms;

        match timeout(Duration::from_millis(millis), self.connect_with_retries()).await {
            Err(_) => return Err(DeviceError::Timeout { operation: "Connecting", millis }),
            Ok(result) => result?,
        }

        self.shared.set_connection(ConnectionState::Initializing);
        info!("Connected; Discovering services...");
        let services = self.transport.discover_services().await?;

        if !self.validate_capabilities(&services) {
            return Err(DeviceError::Unsupported);
        }

        let link = self.new_link_scope();
        self.watch_link(link.clone()).await?;
        self.initialize()?;

        if !self.shared.publish_ready(&link) {
            return Err(DeviceError::LinkLost);
        }
        info!("Peripheral ready");
        Ok(())
    }

    async fn connect_with_retries(&self) -> Result<(), DeviceError> {
        let attempts = self.options.retries + 1;
        let mut attempt = 1;

        loop {
            info!("Connecting to peripheral (attempt {}/{})...", attempt, attempts);

            match self.transport.connect(&self.options).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= attempts => {
                    return Err(DeviceError::ConnectFailed { attempts, source: Box::new(err) });
                },
                Err(err) => {
                    warn!("Connection attempt {} failed: {}", attempt, err);
                    sleep(Duration::from_millis(self.options.retry_delay_ms)).await;
                    attempt += 1;
                },
            }
        }
    }

    // Tear down whatever a failed or cancelled connect() left behind.
    async fn abandon_link(&self) {
        let link = lock(&self.link_cancel).clone();
        self.shared.cancel(&link);
        self.shared.invalidate();

        if let Err(err) = self.transport.disconnect().await {
            debug!("Disconnect after failed connect returned: {}", err);
        }
    }

    /// Resolves the LED and button characteristics from the discovered services.
    ///
    /// Returns false if any of them is missing, the device is then unsupported and none of the
    /// handles are kept.
    pub fn validate_capabilities(&self, services: &[ServiceDescriptor<T::Handle>]) -> bool {
        let handles = CharacteristicHandles::resolve(services);
        let supported = handles.is_some();

        if !supported {
            warn!("Peripheral does not expose the required LED Button Service characteristics");
        }

        *lock(&self.shared.handles) = handles;
        supported
    }

    /// Drops every resolved characteristic; writes fail until the next successful `connect`.
    pub fn invalidate_capabilities(&self) {
        info!("Services invalidated");
        self.shared.invalidate();
    }

    /// Subscribes to both buttons and seeds all four observables from the device.
    ///
    /// The operations run in the background. Each read updates its observable once, the
    /// notification streams keep updating the buttons until the link goes away.
    pub fn initialize(&self) -> Result<(), DeviceError> {
        self.check_released()?;

        let handles = self.shared.handles().ok_or(DeviceError::MissingCharacteristic)?;
        let scope = lock(&self.link_cancel).clone();

        for (button, led) in [(Button::Button1, Led::Led1), (Button::Button2, Led::Led2)] {
            self.forward_notifications(&scope, Observed::Button(button), handles.button(button).clone());
            self.read_once(&scope, Observed::Button(button), handles.button(button).clone());
            self.read_once(&scope, Observed::Led(led), handles.led(led).clone());
        }

        Ok(())
    }

    fn new_link_scope(&self) -> CancellationToken {
        let scope = self.cancel.child_token();
        let previous = std::mem::replace(&mut *lock(&self.link_cancel), scope.clone());
        self.shared.cancel(&previous);
        scope
    }

    fn spawn_scoped<F>(&self, scope: &CancellationToken, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scope = scope.clone();
        let handle = spawn(async move {
            tokio::select! {
                _ = scope.cancelled() => {},
                _ = fut => {},
            }
        });

        let mut tasks = lock(&self.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    fn forward_notifications(&self, scope: &CancellationToken, observed: Observed, handle: T::Handle) {
        let transport = self.transport.clone();
        let shared = self.shared.clone();
        let guard = scope.clone();

        self.spawn_scoped(scope, async move {
            let mut values = match transport.subscribe(&handle).await {
                Ok(values) => values,
                Err(err) => {
                    warn!("Failed to enable notifications for {}: {}", observed, err);
                    return;
                },
            };

            debug!("Notifications enabled for {}", observed);
            while let Some(value) = values.next().await {
                shared.apply(&guard, observed, &value);
            }
            debug!("Notifications for {} stopped", observed);
        });
    }

    fn read_once(&self, scope: &CancellationToken, observed: Observed, handle: T::Handle) {
        let transport = self.transport.clone();
        let shared = self.shared.clone();
        let guard = scope.clone();

        self.spawn_scoped(scope, async move {
            match transport.read(&handle).await {
                Ok(value) => shared.apply(&guard, observed, &value),
                Err(err) => warn!("Failed to read the initial state of {}: {}", observed, err),
            }
        });
    }

    async fn watch_link(&self, scope: CancellationToken) -> Result<(), DeviceError> {
        let mut events = self.transport.events().await?;
        let shared = self.shared.clone();
        let link = scope.clone();

        self.spawn_scoped(&scope, async move {
            while let Some(event) = events.next().await {
                match event {
                    TransportEvent::StateChanged(ConnectionState::Disconnected) => {
                        warn!("Connection lost");
                        shared.link_lost(&link);
                        break;
                    },
                    TransportEvent::StateChanged(ConnectionState::Disconnecting) => {
                        shared.set_connection(ConnectionState::Disconnecting);
                    },
                    TransportEvent::StateChanged(state) => {
                        debug!("Ignoring transport state {:?}", state);
                    },
                    TransportEvent::ServicesInvalidated => {
                        info!("Services invalidated");
                        shared.invalidate();
                    },
                }
            }
        });

        Ok(())
    }

    pub async fn set_led1(&self, state: bool) -> Result<(), DeviceError> {
        self.set_led(Led::Led1, state).await
    }

    pub async fn set_led2(&self, state: bool) -> Result<(), DeviceError> {
        self.set_led(Led::Led2, state).await
    }

    /// Writes the LED and, once the peripheral has acknowledged it, updates the observable.
    pub async fn set_led(&self, led: Led, state: bool) -> Result<(), DeviceError> {
        self.check_released()?;

        if self.shared.connection.get() != ConnectionState::Ready {
            return Err(DeviceError::NotReady);
        }

        let handle = self.shared.handles()
            .map(|handles| handles.led(led).clone())
            .ok_or(DeviceError::MissingCharacteristic)?;

        let value = encode_state(state);
        let millis = WRITE_DEADLINE;

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(DeviceError::Released),
            result = timeout(Duration::from_millis(millis), self.transport.write(&handle, &value)) => match result {
                Err(_) => Err(DeviceError::Timeout { operation: "Writing to the LED characteristic", millis }),
                Ok(result) => result,
            },
        };

        if let Err(err) = result {
            warn!("Failed to turn {} {}: {}", led, on_off(state), err);
            return Err(err);
        }

        if !self.shared.set_guarded(&self.cancel, Observed::Led(led), state) {
            return Err(DeviceError::Released);
        }

        Ok(())
    }

    /// Stops all background work and disconnects. Calling it again does nothing.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.cancel(&self.cancel);
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        for task in tasks {
            task.abort();
        }

        let was_ready = self.shared.connection.get() == ConnectionState::Ready;
        self.shared.invalidate();

        // A pending connect() notices the cancellation and cleans up after itself.
        if was_ready {
            self.shared.set_connection(ConnectionState::Disconnecting);
            info!("Disconnecting from peripheral...");

            if let Err(err) = self.transport.disconnect().await {
                warn!("Failed to disconnect from peripheral: {}", err);
            }

            self.shared.set_connection(ConnectionState::Disconnected);
        }

        info!("Session released");
    }
}

impl<T: Transport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
