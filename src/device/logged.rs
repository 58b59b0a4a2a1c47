use std::sync::Arc;
use log::{info, warn};
use tokio::spawn;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::session::DeviceSession;
use crate::device::transport::Transport;
use crate::device::types::{BlinkyState, Button, ConnectionState, Led};
use crate::error::DeviceError;

/// Log target for the human readable LED / button history of a session.
pub const APPLICATION_LOG_TARGET: &str = "blinky::application";

fn log_transitions(
    cancel: CancellationToken,
    device: String,
    mut rx: broadcast::Receiver<bool>,
    on: String,
    off: String,
) -> JoinHandle<()> {
    spawn(async move {
        let log = |state: bool| {
            let message = if state { &on } else { &off };
            info!(target: APPLICATION_LOG_TARGET, "[{}] {}", device, message);
        };

        'mainloop: loop {
            tokio::select! {
                biased;

                received = rx.recv() => match received {
                    Ok(state) => log(state),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: APPLICATION_LOG_TARGET, "[{}] {} transition(s) were not logged", device, skipped);
                    },
                    Err(RecvError::Closed) => break 'mainloop,
                },
                _ = cancel.cancelled() => {
                    // whatever was queued before cancelling still gets written
                    loop {
                        match rx.try_recv() {
                            Ok(state) => log(state),
                            Err(TryRecvError::Lagged(_)) => continue,
                            Err(_) => break 'mainloop,
                        }
                    }
                },
            }
        }
    })
}

/// Wraps a [`DeviceSession`] and writes every LED toggle and button press to the application log.
pub struct LoggedSession<T: Transport> {
    session: Arc<DeviceSession<T>>,
    device: String,
    cancel: CancellationToken,
    loggers: Vec<JoinHandle<()>>,
}

impl<T: Transport> LoggedSession<T> {
    pub fn new(session: DeviceSession<T>, device: impl Into<String>) -> Self {
        let session = Arc::new(session);
        let device = device.into();
        let cancel = CancellationToken::new();

        let mut loggers = Vec::new();
        for led in [Led::Led1, Led::Led2] {
            loggers.push(log_transitions(
                cancel.clone(),
                device.clone(),
                session.led_transitions(led),
                format!("{} turned ON", led),
                format!("{} turned OFF", led),
            ));
        }
        for button in [Button::Button1, Button::Button2] {
            loggers.push(log_transitions(
                cancel.clone(),
                device.clone(),
                session.button_transitions(button),
                format!("{} pressed", button),
                format!("{} released", button),
            ));
        }

        LoggedSession { session, device, cancel, loggers }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn session(&self) -> &Arc<DeviceSession<T>> {
        &self.session
    }

    pub async fn connect(&self) -> Result<(), DeviceError> {
        info!(target: APPLICATION_LOG_TARGET, "[{}] Connecting...", self.device);
        self.session.connect().await
    }

    pub async fn release(&mut self) {
        self.session.release().await;

        self.cancel.cancel();
        for logger in self.loggers.drain(..) {
            let _ = logger.await;
        }
    }

    pub async fn set_led1(&self, state: bool) -> Result<(), DeviceError> {
        self.session.set_led1(state).await
    }

    pub async fn set_led2(&self, state: bool) -> Result<(), DeviceError> {
        self.session.set_led2(state).await
    }

    pub async fn set_led(&self, led: Led, state: bool) -> Result<(), DeviceError> {
        self.session.set_led(led, state).await
    }

    pub fn state(&self) -> watch::Receiver<BlinkyState> {
        self.session.state()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.session.connection_state()
    }

    pub fn led1(&self) -> watch::Receiver<bool> {
        self.session.led1()
    }

    pub fn led2(&self) -> watch::Receiver<bool> {
        self.session.led2()
    }

    pub fn button1(&self) -> watch::Receiver<bool> {
        self.session.button1()
    }

    pub fn button2(&self) -> watch::Receiver<bool> {
        self.session.button2()
    }
}

impl<T: Transport> Drop for LoggedSession<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
